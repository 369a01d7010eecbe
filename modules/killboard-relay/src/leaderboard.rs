use std::collections::HashMap;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeaderboardEntry {
    pub key: String,
    pub count: u64,
}

/// Occurrence counter that remembers first-seen order, so that ranking is
/// deterministic for tied counts.
#[derive(Debug, Default)]
pub struct Tally {
    entries: Vec<LeaderboardEntry>,
    index: HashMap<String, usize>,
}

impl Tally {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one occurrence of `key`. Empty keys are ignored.
    pub fn add(&mut self, key: &str) {
        if key.is_empty() {
            return;
        }
        match self.index.get(key) {
            Some(&i) => self.entries[i].count += 1,
            None => {
                self.index.insert(key.to_string(), self.entries.len());
                self.entries.push(LeaderboardEntry {
                    key: key.to_string(),
                    count: 1,
                });
            }
        }
    }

    pub fn get(&self, key: &str) -> u64 {
        self.index.get(key).map(|&i| self.entries[i].count).unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Keys in first-seen order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.key.as_str())
    }

    /// Count descending, ties in first-seen order, truncated to `n`.
    pub fn top(&self, n: usize) -> Vec<LeaderboardEntry> {
        let mut ranked = self.entries.clone();
        // `sort_by` is stable.
        ranked.sort_by(|a, b| b.count.cmp(&a.count));
        ranked.truncate(n);
        ranked
    }
}

/// Per-player kill/death ratio entry.
#[derive(Debug, Clone, PartialEq)]
pub struct KdEntry {
    pub player: String,
    pub kills: u64,
    pub deaths: u64,
    /// `kills / max(1, deaths)`.
    pub ratio: f64,
}

/// Rank players with at least one kill by K/D ratio. Ties keep the
/// first-seen order of `kills`.
pub fn rank_kd(kills: &Tally, deaths: &Tally, n: usize) -> Vec<KdEntry> {
    let mut ranked: Vec<KdEntry> = kills
        .keys()
        .map(|player| {
            let k = kills.get(player);
            let d = deaths.get(player);
            KdEntry {
                player: player.to_string(),
                kills: k,
                deaths: d,
                ratio: k as f64 / d.max(1) as f64,
            }
        })
        .collect();
    ranked.sort_by(|a, b| b.ratio.total_cmp(&a.ratio));
    ranked.truncate(n);
    ranked
}

/// Overall kill/death ratio.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum KdRatio {
    /// No deaths in the window.
    NotApplicable,
    Ratio(f64),
}

impl KdRatio {
    pub fn compute(kills: u64, deaths: u64) -> Self {
        if deaths == 0 {
            Self::NotApplicable
        } else {
            Self::Ratio(kills as f64 / deaths as f64)
        }
    }
}

impl fmt::Display for KdRatio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotApplicable => f.write_str("N/A"),
            Self::Ratio(r) => write!(f, "{r:.2}"),
        }
    }
}
