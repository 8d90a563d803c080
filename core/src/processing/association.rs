//! Nearest-position greedy assignment of detection slots to open tracks.
//!
//! All (track, slot) pairs inside the gating radius are ranked by
//! Euclidean distance between the slot's raw position and the track's last
//! smoothed position. Pairs are taken in ascending order; each track and
//! each slot is used at most once. Equal distances go to the lower track
//! serial, then to the lower slot channel, so live and replayed runs agree.

use crate::math::kinematics::KinematicsHelper;
use crate::wire::detection::RawDetectionSlot;

/// One candidate pairing that passed the gate.
#[derive(Clone, Debug, PartialEq)]
pub struct AssignEdge {
    pub track_id: u64,
    pub slot_idx: usize,
    pub distance: f64,
}

/// Outcome of one association round. Slot indices refer to the input slice.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Assignment {
    pub pairs: Vec<AssignEdge>,
    pub unmatched_slots: Vec<usize>,
    pub unmatched_tracks: Vec<u64>,
}

/// `tracks` lists `(serial, last smoothed position)` for every open track.
pub fn associate(
    tracks: &[(u64, (f64, f64))],
    slots: &[RawDetectionSlot],
    gating_radius_mm: f64,
) -> Assignment {
    let mut edges = Vec::with_capacity(tracks.len() * slots.len());
    for &(track_id, position) in tracks {
        for (slot_idx, slot) in slots.iter().enumerate() {
            let distance = KinematicsHelper::distance(slot.position(), position);
            if distance <= gating_radius_mm {
                edges.push(AssignEdge {
                    track_id,
                    slot_idx,
                    distance,
                });
            }
        }
    }

    edges.sort_by(|a, b| {
        a.distance
            .total_cmp(&b.distance)
            .then(a.track_id.cmp(&b.track_id))
            .then(slots[a.slot_idx].slot.cmp(&slots[b.slot_idx].slot))
    });

    let mut track_used: Vec<u64> = Vec::with_capacity(tracks.len());
    let mut slot_used = vec![false; slots.len()];
    let mut pairs = Vec::new();
    for edge in edges {
        if slot_used[edge.slot_idx] || track_used.contains(&edge.track_id) {
            continue;
        }
        slot_used[edge.slot_idx] = true;
        track_used.push(edge.track_id);
        pairs.push(edge);
    }

    let unmatched_slots = slot_used
        .iter()
        .enumerate()
        .filter(|(_, used)| !**used)
        .map(|(idx, _)| idx)
        .collect();
    let unmatched_tracks = tracks
        .iter()
        .map(|&(id, _)| id)
        .filter(|id| !track_used.contains(id))
        .collect();

    Assignment {
        pairs,
        unmatched_slots,
        unmatched_tracks,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn slot(channel: u8, x: i32, y: i32) -> RawDetectionSlot {
        RawDetectionSlot::new(channel, x, y, 0, 0)
    }

    #[test]
    fn nearest_pairs_win_regardless_of_channel() {
        let tracks = [(1, (0.0, 0.0)), (2, (1000.0, 0.0))];
        // channels swapped relative to the tracks' previous positions
        let slots = [slot(0, 990, 0), slot(1, 10, 0)];
        let result = associate(&tracks, &slots, 200.0);
        assert_eq!(result.pairs.len(), 2);
        let for_track = |id| result.pairs.iter().find(|e| e.track_id == id).unwrap().slot_idx;
        assert_eq!(for_track(1), 1);
        assert_eq!(for_track(2), 0);
        assert!(result.unmatched_slots.is_empty());
        assert!(result.unmatched_tracks.is_empty());
    }

    #[test]
    fn slot_outside_gate_is_unmatched() {
        let tracks = [(7, (0.0, 0.0))];
        let slots = [slot(0, 3000, 0)];
        let result = associate(&tracks, &slots, 500.0);
        assert!(result.pairs.is_empty());
        assert_eq!(result.unmatched_slots, vec![0]);
        assert_eq!(result.unmatched_tracks, vec![7]);
    }

    #[test]
    fn equal_distance_goes_to_lower_serial() {
        let tracks = [(9, (200.0, 0.0)), (4, (-200.0, 0.0))];
        let slots = [slot(2, 0, 0)];
        let result = associate(&tracks, &slots, 500.0);
        assert_eq!(result.pairs.len(), 1);
        assert_eq!(result.pairs[0].track_id, 4);
        assert_eq!(result.unmatched_tracks, vec![9]);
    }

    #[test]
    fn each_track_used_once_per_batch() {
        let tracks = [(1, (0.0, 0.0))];
        let slots = [slot(0, 10, 0), slot(1, 20, 0)];
        let result = associate(&tracks, &slots, 500.0);
        assert_eq!(result.pairs.len(), 1);
        assert_eq!(result.pairs[0].slot_idx, 0);
        assert_eq!(result.unmatched_slots, vec![1]);
    }
}
