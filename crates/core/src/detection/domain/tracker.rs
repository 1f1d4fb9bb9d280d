/// Greedy IoU multi-object tracker.
///
/// Each frame ages every track, matches detections first-fit against tracks
/// in id order, spawns tracks for leftovers and evicts tracks that have gone
/// stale. There is no motion model: an unmatched track keeps its last box.
use std::collections::{BTreeMap, HashSet};

use crate::shared::bounding_box::BoundingBox;
use crate::shared::config::TrackingConfig;
use crate::shared::frame::TrackId;

const FIRST_TRACK_ID: TrackId = 1;

#[derive(Clone, Debug, PartialEq)]
pub struct Track {
    pub id: TrackId,
    pub bbox: BoundingBox,
    pub frames_since_update: u32,
}

impl Track {
    fn new(id: TrackId, bbox: BoundingBox) -> Self {
        Self {
            id,
            bbox,
            frames_since_update: 0,
        }
    }

    fn predict(&mut self) {
        self.frames_since_update += 1;
    }

    fn update(&mut self, bbox: BoundingBox) {
        self.bbox = bbox;
        self.frames_since_update = 0;
    }
}

/// Outcome of one [`Tracker::update`] call.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TrackUpdate {
    /// Track id per input detection, in detection order.
    pub ids: Vec<TrackId>,
    pub created: Vec<TrackId>,
    pub evicted: Vec<TrackId>,
}

/// Track table keyed by id; iteration order is ascending id, which is also
/// creation order.
pub type TrackTable = BTreeMap<TrackId, Track>;

pub struct Tracker {
    tracks: TrackTable,
    next_id: TrackId,
    iou_threshold: f64,
    max_frames_to_skip: u32,
}

impl Tracker {
    pub fn new(config: TrackingConfig) -> Self {
        Self {
            tracks: TrackTable::new(),
            next_id: FIRST_TRACK_ID,
            iou_threshold: config.iou_threshold as f64,
            max_frames_to_skip: config.max_frames_to_skip,
        }
    }

    pub fn update(&mut self, detections: &[BoundingBox]) -> TrackUpdate {
        self.predict();

        let (mut ids, unmatched) = self.associate(detections);
        let created = self.create_tracks(&unmatched, detections, &mut ids);
        let evicted = self.evict_stale();

        TrackUpdate {
            ids: ids.into_iter().flatten().collect(),
            created,
            evicted,
        }
    }

    fn predict(&mut self) {
        for track in self.tracks.values_mut() {
            track.predict();
        }
    }

    /// First-fit matching: each detection takes the first unclaimed track
    /// whose IoU is strictly above the threshold.
    fn associate(&mut self, detections: &[BoundingBox]) -> (Vec<Option<TrackId>>, Vec<usize>) {
        let mut ids = vec![None; detections.len()];
        let mut claimed: HashSet<TrackId> = HashSet::new();
        let mut unmatched = Vec::new();
        let threshold = self.iou_threshold;

        for (di, det) in detections.iter().enumerate() {
            let candidate = self
                .tracks
                .values_mut()
                .find(|t| !claimed.contains(&t.id) && t.bbox.iou(det) > threshold);

            match candidate {
                Some(track) => {
                    track.update(*det);
                    claimed.insert(track.id);
                    ids[di] = Some(track.id);
                }
                None => unmatched.push(di),
            }
        }

        (ids, unmatched)
    }

    fn create_tracks(
        &mut self,
        unmatched: &[usize],
        detections: &[BoundingBox],
        ids: &mut [Option<TrackId>],
    ) -> Vec<TrackId> {
        let mut created = Vec::with_capacity(unmatched.len());
        for &di in unmatched {
            let id = self.next_id;
            self.next_id += 1;
            self.tracks.insert(id, Track::new(id, detections[di]));
            ids[di] = Some(id);
            created.push(id);
        }
        created
    }

    fn evict_stale(&mut self) -> Vec<TrackId> {
        let max = self.max_frames_to_skip;
        let stale: Vec<TrackId> = self
            .tracks
            .values()
            .filter(|t| t.frames_since_update > max)
            .map(|t| t.id)
            .collect();
        for id in &stale {
            self.tracks.remove(id);
        }
        stale
    }

    pub fn get(&self, id: TrackId) -> Option<&Track> {
        self.tracks.get(&id)
    }

    pub fn ids(&self) -> Vec<TrackId> {
        self.tracks.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    /// Total tracks ever created.
    pub fn created_count(&self) -> usize {
        (self.next_id - FIRST_TRACK_ID) as usize
    }
}
