use chrono::NaiveDateTime;
use rand::seq::SliceRandom;
use rand::Rng;

use photoloop_state::{MediaEntry, MediaId, PlaylistOrder};

/// Parameters for recency-weighted ordering: weight is 1.0 at age zero and
/// `min_weight` at `cutoff_years` and beyond, linearly interpolated.
#[derive(Debug, Clone, Copy)]
pub struct RecencyPolicy {
    pub cutoff_years: f32,
    pub min_weight: f32,
}

impl Default for RecencyPolicy {
    fn default() -> Self {
        RecencyPolicy {
            cutoff_years: 5.0,
            min_weight: 0.33,
        }
    }
}

/// The ordered sequence of displayable media and a cursor pointing at the
/// next item to hand out.
#[derive(Debug, Clone, Default)]
pub struct Playlist {
    ids: Vec<MediaId>,
    index: usize,
    order: PlaylistOrder,
}

impl Playlist {
    /// Build an ordered playlist from pre-filtered entries. The caller has
    /// already applied the displayability filter (active, bytes on disk,
    /// enabled source, kind allowed).
    pub fn build(
        entries: &[&MediaEntry],
        order: PlaylistOrder,
        recency: RecencyPolicy,
        now: NaiveDateTime,
        rng: &mut impl Rng,
    ) -> Self {
        let ids = match order {
            PlaylistOrder::Random => {
                let mut ids: Vec<MediaId> = entries.iter().map(|e| e.media_id.clone()).collect();
                ids.shuffle(rng);
                ids
            }
            PlaylistOrder::Alphabetical => {
                let mut sorted = entries.to_vec();
                sorted.sort_by_cached_key(|e| {
                    e.local_path
                        .file_name()
                        .map(|n| n.to_string_lossy().to_lowercase())
                        .unwrap_or_default()
                });
                sorted.iter().map(|e| e.media_id.clone()).collect()
            }
            PlaylistOrder::Chronological => {
                let mut sorted = entries.to_vec();
                // `None` sorts first, so undated items lead the sequence.
                sorted.sort_by_cached_key(|e| effective_date(e));
                sorted.iter().map(|e| e.media_id.clone()).collect()
            }
            PlaylistOrder::RecencyWeighted => weighted_order(entries, recency, now, rng),
        };

        Playlist {
            ids,
            index: 0,
            order,
        }
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Return the item at the cursor and advance, wrapping around. Random
    /// playlists reshuffle on wraparound so each lap is a fresh permutation.
    pub fn next(&mut self, rng: &mut impl Rng) -> Option<MediaId> {
        if self.ids.is_empty() {
            return None;
        }
        let id = self.ids[self.index].clone();
        self.index = (self.index + 1) % self.ids.len();
        if self.index == 0 && self.order == PlaylistOrder::Random {
            self.ids.shuffle(rng);
        }
        Some(id)
    }

    /// Step the cursor back one shown item and return it. Because `next`
    /// leaves the cursor one past what it returned, this moves back two and
    /// then returns-and-advances, so `next, next, previous` shows the first
    /// item again.
    pub fn previous(&mut self) -> Option<MediaId> {
        if self.ids.is_empty() {
            return None;
        }
        let len = self.ids.len() as i64;
        self.index = (self.index as i64 - 2).rem_euclid(len) as usize;
        let id = self.ids[self.index].clone();
        self.index = (self.index + 1) % self.ids.len();
        Some(id)
    }
}

/// Photo date with fallback: embedded date, then the remote album's date,
/// then the file modification time.
fn effective_date(entry: &MediaEntry) -> Option<NaiveDateTime> {
    entry
        .exif_date
        .or(entry.remote_date)
        .or_else(|| entry.file_mtime.map(|t| t.naive_local()))
}

fn recency_weight(entry: &MediaEntry, recency: RecencyPolicy, now: NaiveDateTime) -> f32 {
    let cutoff_days = (recency.cutoff_years * 365.0).max(1.0);
    let age_days = match effective_date(entry) {
        Some(date) => ((now - date).num_days().max(0)) as f32,
        // Undated items count as brand new rather than ancient.
        None => 0.0,
    };
    if age_days >= cutoff_days {
        recency.min_weight
    } else {
        1.0 - (1.0 - recency.min_weight) * (age_days / cutoff_days)
    }
}

/// Weighted random permutation without replacement: repeatedly draw one item
/// with probability proportional to its recency weight.
fn weighted_order(
    entries: &[&MediaEntry],
    recency: RecencyPolicy,
    now: NaiveDateTime,
    rng: &mut impl Rng,
) -> Vec<MediaId> {
    let mut remaining: Vec<(MediaId, f32)> = entries
        .iter()
        .map(|e| (e.media_id.clone(), recency_weight(e, recency, now)))
        .collect();
    let mut ordered = Vec::with_capacity(remaining.len());

    while !remaining.is_empty() {
        let total: f32 = remaining.iter().map(|(_, w)| w).sum();
        let mut target = rng.random_range(0.0..total.max(f32::MIN_POSITIVE));
        let mut picked = remaining.len() - 1;
        for (i, (_, weight)) in remaining.iter().enumerate() {
            if target < *weight {
                picked = i;
                break;
            }
            target -= weight;
        }
        ordered.push(remaining.swap_remove(picked).0);
    }

    ordered
}
