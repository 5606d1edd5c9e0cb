use std::cmp::Ordering;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StatusClass {
    InProgress,
    Finished,
    Invalid,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StatusEntry {
    pub key: String,
    pub label: String,
    pub rank: u32,
    pub class: StatusClass,
    /// Order status mirrored onto the linked commerce order.
    pub order_status: String,
}

/// Ordered table of booking statuses, loaded once from configuration.
///
/// Advancement is compared by `rank`; several keys may share a rank.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct StatusTaxonomy {
    statuses: Vec<StatusEntry>,
    initial: String,
    cancelled: String,
    refunded: String,
}

#[derive(Deserialize)]
struct RawTaxonomy {
    statuses: Vec<RawEntry>,
    #[serde(default = "default_initial")]
    initial: String,
    #[serde(default = "default_cancelled")]
    cancelled: String,
    #[serde(default = "default_refunded")]
    refunded: String,
}

#[derive(Deserialize)]
struct RawEntry {
    key: String,
    #[serde(default)]
    label: Option<String>,
    #[serde(default)]
    rank: Option<u32>,
    class: StatusClass,
    #[serde(default)]
    order_status: Option<String>,
}

fn default_initial() -> String {
    "created".to_string()
}

fn default_cancelled() -> String {
    "cancelled".to_string()
}

fn default_refunded() -> String {
    "refunded".to_string()
}

impl Default for StatusTaxonomy {
    fn default() -> Self {
        let table = [
            ("created", "Created", StatusClass::InProgress, "pending"),
            ("pending", "Pending payment", StatusClass::InProgress, "pending"),
            ("on-hold", "On hold", StatusClass::InProgress, "on-hold"),
            ("processing", "Processing", StatusClass::InProgress, "processing"),
            ("completed", "Completed", StatusClass::Finished, "completed"),
            ("cancelled", "Cancelled", StatusClass::Invalid, "cancelled"),
            ("refunded", "Refunded", StatusClass::Invalid, "refunded"),
            ("failed", "Failed", StatusClass::Invalid, "failed"),
        ];
        let statuses = table
            .iter()
            .enumerate()
            .map(|(rank, (key, label, class, order_status))| StatusEntry {
                key: key.to_string(),
                label: label.to_string(),
                rank: rank as u32,
                class: *class,
                order_status: order_status.to_string(),
            })
            .collect();
        Self {
            statuses,
            initial: default_initial(),
            cancelled: default_cancelled(),
            refunded: default_refunded(),
        }
    }
}

impl StatusTaxonomy {
    pub fn from_json(s: &str) -> anyhow::Result<Self> {
        let raw: RawTaxonomy = serde_json::from_str(s)?;
        anyhow::ensure!(!raw.statuses.is_empty(), "status table is empty");

        let mut statuses: Vec<StatusEntry> = Vec::with_capacity(raw.statuses.len());
        for (position, entry) in raw.statuses.into_iter().enumerate() {
            anyhow::ensure!(
                statuses.iter().all(|s| s.key != entry.key),
                "duplicate status key: {}",
                entry.key
            );
            statuses.push(StatusEntry {
                label: entry.label.unwrap_or_else(|| entry.key.clone()),
                rank: entry.rank.unwrap_or(position as u32),
                class: entry.class,
                order_status: entry.order_status.unwrap_or_else(|| entry.key.clone()),
                key: entry.key,
            });
        }

        let taxonomy = Self {
            statuses,
            initial: raw.initial,
            cancelled: raw.cancelled,
            refunded: raw.refunded,
        };
        for role in [&taxonomy.initial, &taxonomy.cancelled, &taxonomy.refunded] {
            anyhow::ensure!(taxonomy.get(role).is_some(), "unknown status in roles: {role}");
        }
        Ok(taxonomy)
    }

    pub fn entries(&self) -> &[StatusEntry] {
        &self.statuses
    }

    pub fn get(&self, key: &str) -> Option<&StatusEntry> {
        self.statuses.iter().find(|s| s.key == key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn initial(&self) -> &str {
        &self.initial
    }

    pub fn cancelled(&self) -> &str {
        &self.cancelled
    }

    pub fn refunded(&self) -> &str {
        &self.refunded
    }

    pub fn rank(&self, key: &str) -> Option<u32> {
        self.get(key).map(|s| s.rank)
    }

    /// `Greater` when `a` is further along than `b`. Unknown keys do not compare.
    pub fn compare_advancement(&self, a: &str, b: &str) -> Option<Ordering> {
        Some(self.rank(a)?.cmp(&self.rank(b)?))
    }

    pub fn is_at_least(&self, a: &str, b: &str) -> bool {
        matches!(
            self.compare_advancement(a, b),
            Some(Ordering::Greater | Ordering::Equal)
        )
    }

    fn has_class(&self, key: &str, class: StatusClass) -> bool {
        self.get(key).is_some_and(|s| s.class == class)
    }

    pub fn is_finished(&self, key: &str) -> bool {
        self.has_class(key, StatusClass::Finished)
    }

    pub fn is_in_progress(&self, key: &str) -> bool {
        self.has_class(key, StatusClass::InProgress)
    }

    /// Invalid bookings (cancelled, refunded, failed) never occupy dates.
    /// Keys missing from the table are treated the same way.
    pub fn is_invalid(&self, key: &str) -> bool {
        self.get(key).map_or(true, |s| s.class == StatusClass::Invalid)
    }

    pub fn order_status_for(&self, key: &str) -> Option<&str> {
        self.get(key).map(|s| s.order_status.as_str())
    }

    /// Reverse mapping. When several booking statuses mirror the same order
    /// status, the first one in the table wins.
    pub fn booking_status_for(&self, order_status: &str) -> Option<&str> {
        self.statuses
            .iter()
            .find(|s| s.order_status == order_status)
            .map(|s| s.key.as_str())
    }

    /// Most advanced status among `candidates` (`(status, updated_at)`).
    ///
    /// Higher rank wins; on equal rank the most recently updated candidate
    /// wins; on a full tie the earliest candidate wins. Unknown keys are skipped.
    pub fn most_advanced<'a, I>(&self, candidates: I) -> Option<&'a str>
    where
        I: IntoIterator<Item = (&'a str, NaiveDateTime)>,
    {
        let mut best: Option<(&'a str, u32, NaiveDateTime)> = None;
        for (key, updated_at) in candidates {
            let Some(rank) = self.rank(key) else {
                continue;
            };
            let replace = match best {
                None => true,
                Some((_, best_rank, best_at)) => {
                    rank > best_rank || (rank == best_rank && updated_at > best_at)
                }
            };
            if replace {
                best = Some((key, rank, updated_at));
            }
        }
        best.map(|(key, _, _)| key)
    }
}
