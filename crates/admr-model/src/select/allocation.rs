//! Allocation of audioTrackUIDs to channels within pack formats
//!
//! Each candidate pack is a root audioPackFormat with a list of channels,
//! each carrying the nested-pack path that a track referencing it must name.
//! Tracks are matched against these patterns; the search enumerates every
//! complete assignment, so callers can distinguish "no solution"
//! (conflicting references) from "several solutions" (ambiguous references).

use crate::elements::{ChannelFormatRef, PackFormatRef, TrackUidRef};

/// A channel to allocate within an `AllocationPack`.
#[derive(Debug, Clone)]
pub struct AllocationChannel {
    /// Channel format to match against tracks
    pub channel_format: ChannelFormatRef,
    /// Packs on the path from the root pack to this channel; an allocated
    /// track must reference one of them
    pub pack_formats: Vec<PackFormatRef>,
}

/// A complete candidate pack with its channels.
#[derive(Debug, Clone)]
pub struct AllocationPack {
    pub root_pack: PackFormatRef,
    pub channels: Vec<AllocationChannel>,
}

/// A track to allocate: the channel and pack formats referenced (indirectly)
/// by one audioTrackUID.
#[derive(Debug, Clone)]
pub struct AllocationTrack {
    pub channel_format: ChannelFormatRef,
    pub pack_format: Option<PackFormatRef>,
    pub track_uid: TrackUidRef,
}

/// The state of one channel slot during/after allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot {
    Empty,
    Silent,
    /// Index into the `tracks` array passed to `allocate_packs`
    Track(usize),
}

/// One allocated pack: an index into the candidate packs, and a slot per
/// channel of that pack.
#[derive(Debug, Clone)]
pub struct AllocatedPack {
    pub pack: usize,
    pub slots: Vec<Slot>,
}

/// A complete solution.
pub type Solution = Vec<AllocatedPack>;

/// Is a track (or a silent reference) compatible with a channel?
fn is_compatible(track: Option<&AllocationTrack>, channel: &AllocationChannel) -> bool {
    match track {
        None => true,
        Some(track) => {
            track.channel_format == channel.channel_format
                && track
                    .pack_format
                    .is_some_and(|p| channel.pack_formats.contains(&p))
        }
    }
}

/// Allocate tracks to channels and packs, returning at most `max_solutions`
/// distinct solutions.
///
/// `pack_refs` is the audioPackFormat reference list of the audioObject, or
/// `None` for CHNA-only operation where the packs are determined
/// automatically. `num_silent_tracks` is the number of `ATU_00000000`
/// references.
pub fn allocate_packs(
    packs: &[AllocationPack],
    tracks: &[AllocationTrack],
    pack_refs: Option<&[PackFormatRef]>,
    num_silent_tracks: usize,
    max_solutions: usize,
) -> Vec<Solution> {
    // real tracks first, then the silent ones; silent tracks are equivalent,
    // which the search exploits to avoid duplicate solutions
    let track_slots: Vec<Option<usize>> = (0..tracks.len())
        .map(Some)
        .chain((0..num_silent_tracks).map(|_| None))
        .collect();

    let mut ctx = Search {
        packs,
        tracks,
        max_solutions,
        solutions: Vec::new(),
    };

    let all_packs: Vec<usize> = (0..packs.len()).collect();
    ctx.step(&track_slots, pack_refs.map(|r| r.to_vec()), Vec::new(), &all_packs);
    ctx.solutions
}

struct Search<'a> {
    packs: &'a [AllocationPack],
    tracks: &'a [AllocationTrack],
    max_solutions: usize,
    solutions: Vec<Solution>,
}

impl<'a> Search<'a> {
    fn track(&self, slot: Option<usize>) -> Option<&'a AllocationTrack> {
        slot.map(|i| &self.tracks[i])
    }

    fn slot_of(track: Option<usize>) -> Slot {
        match track {
            Some(i) => Slot::Track(i),
            None => Slot::Silent,
        }
    }

    /// Consider the possible allocations of the first remaining track;
    /// recursion enumerates all solutions.
    fn step(
        &mut self,
        remaining: &[Option<usize>],
        pack_refs: Option<Vec<PackFormatRef>>,
        partial: Vec<AllocatedPack>,
        live_packs: &[usize],
    ) {
        if self.solutions.len() >= self.max_solutions {
            return;
        }

        if remaining.is_empty() {
            let complete = partial
                .iter()
                .all(|p| p.slots.iter().all(|s| *s != Slot::Empty));
            let refs_done = pack_refs.as_ref().map_or(true, |r| r.is_empty());
            if complete && refs_done {
                self.solutions.push(partial);
            }
            return;
        }

        let empty_in_partial: usize = partial
            .iter()
            .map(|p| p.slots.iter().filter(|s| **s == Slot::Empty).count())
            .sum();

        if remaining.len() < empty_in_partial {
            return;
        }

        // drop candidate packs which could not possibly be allocated now or
        // in any sub-call
        let spare_tracks = remaining.len() - empty_in_partial;
        let filtered: Vec<usize> = live_packs
            .iter()
            .copied()
            .filter(|&pi| {
                let pack = &self.packs[pi];
                if pack.channels.len() > spare_tracks {
                    return false;
                }
                if let Some(refs) = &pack_refs {
                    if !refs.contains(&pack.root_pack) {
                        return false;
                    }
                }
                pack.channels.iter().all(|channel| {
                    remaining
                        .iter()
                        .any(|&t| is_compatible(self.track(t), channel))
                })
            })
            .collect();

        let (track_slot, rest) = (remaining[0], &remaining[1..]);
        let track = self.track(track_slot);

        // try assigning the track to an empty compatible channel of an
        // existing allocation
        for (i, allocated) in partial.iter().enumerate() {
            let pack = &self.packs[allocated.pack];
            for (ci, slot) in allocated.slots.iter().enumerate() {
                if *slot == Slot::Empty && is_compatible(track, &pack.channels[ci]) {
                    let mut new_partial = partial.clone();
                    new_partial[i].slots[ci] = Self::slot_of(track_slot);
                    self.step_obvious(rest, pack_refs.clone(), new_partial, &filtered);

                    // a silent track allocated to any existing channel is
                    // equivalent to any other choice; don't also start new
                    // packs for it
                    if track.is_none() {
                        return;
                    }
                    break;
                }
            }
        }

        // try starting a new pack
        for &pi in &filtered {
            let pack = &self.packs[pi];

            let remaining_refs = match &pack_refs {
                Some(refs) => {
                    let Some(pos) = refs.iter().position(|&r| r == pack.root_pack) else {
                        continue;
                    };
                    let mut refs = refs.clone();
                    refs.remove(pos);
                    Some(refs)
                }
                None => None,
            };

            let Some(ci) = pack
                .channels
                .iter()
                .position(|channel| is_compatible(track, channel))
            else {
                continue;
            };

            let mut slots = vec![Slot::Empty; pack.channels.len()];
            slots[ci] = Self::slot_of(track_slot);

            let mut new_partial = partial.clone();
            new_partial.push(AllocatedPack { pack: pi, slots });
            self.step_obvious(rest, remaining_refs, new_partial, &filtered);
        }
    }

    /// Fill channels which have exactly one possible remaining track before
    /// recursing; discard the branch if a channel has none.
    fn step_obvious(
        &mut self,
        remaining: &[Option<usize>],
        pack_refs: Option<Vec<PackFormatRef>>,
        mut partial: Vec<AllocatedPack>,
        live_packs: &[usize],
    ) {
        let mut tracks: Vec<Option<usize>> = remaining.to_vec();

        for allocated in &mut partial {
            let pack = &self.packs[allocated.pack];
            for (ci, slot) in allocated.slots.iter_mut().enumerate() {
                if *slot != Slot::Empty {
                    continue;
                }

                let possible: Vec<usize> = tracks
                    .iter()
                    .enumerate()
                    .filter(|(_, &t)| is_compatible(self.track(t), &pack.channels[ci]))
                    .map(|(i, _)| i)
                    .collect();

                match possible.as_slice() {
                    [] => return,
                    // one possible track, or the first possible track is
                    // silent (silent tracks sort last and are equivalent)
                    [only] => {
                        *slot = Self::slot_of(tracks.remove(*only));
                    }
                    [first, ..] if tracks[*first].is_none() => {
                        *slot = Self::slot_of(tracks.remove(*first));
                    }
                    _ => {}
                }
            }
        }

        self.step(&tracks, pack_refs, partial, live_packs);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cf(i: usize) -> ChannelFormatRef {
        ChannelFormatRef(i)
    }

    fn pf(i: usize) -> PackFormatRef {
        PackFormatRef(i)
    }

    fn uid(i: usize) -> TrackUidRef {
        TrackUidRef(i)
    }

    fn stereo_pack() -> AllocationPack {
        AllocationPack {
            root_pack: pf(0),
            channels: vec![
                AllocationChannel { channel_format: cf(0), pack_formats: vec![pf(0)] },
                AllocationChannel { channel_format: cf(1), pack_formats: vec![pf(0)] },
            ],
        }
    }

    fn track(channel: usize, pack: usize, n: usize) -> AllocationTrack {
        AllocationTrack {
            channel_format: cf(channel),
            pack_format: Some(pf(pack)),
            track_uid: uid(n),
        }
    }

    #[test]
    fn test_simple_allocation() {
        let packs = vec![stereo_pack()];
        let tracks = vec![track(0, 0, 0), track(1, 0, 1)];
        let refs = [pf(0)];

        let solutions = allocate_packs(&packs, &tracks, Some(&refs), 0, 2);
        assert_eq!(solutions.len(), 1);
        let solution = &solutions[0];
        assert_eq!(solution.len(), 1);
        assert_eq!(solution[0].slots, vec![Slot::Track(0), Slot::Track(1)]);
    }

    #[test]
    fn test_silent_tracks() {
        let packs = vec![stereo_pack()];
        let tracks = vec![track(0, 0, 0)];
        let refs = [pf(0)];

        let solutions = allocate_packs(&packs, &tracks, Some(&refs), 1, 2);
        assert_eq!(solutions.len(), 1);
        assert_eq!(solutions[0][0].slots, vec![Slot::Track(0), Slot::Silent]);
    }

    #[test]
    fn test_conflicting_refs() {
        let packs = vec![stereo_pack()];
        // track references the wrong pack
        let tracks = vec![track(0, 1, 0), track(1, 0, 1)];
        let refs = [pf(0)];

        let solutions = allocate_packs(&packs, &tracks, Some(&refs), 0, 2);
        assert!(solutions.is_empty());
    }

    #[test]
    fn test_missing_track_is_conflict() {
        let packs = vec![stereo_pack()];
        let tracks = vec![track(0, 0, 0)];
        let refs = [pf(0)];

        let solutions = allocate_packs(&packs, &tracks, Some(&refs), 0, 2);
        assert!(solutions.is_empty());
    }

    #[test]
    fn test_ambiguous_all_silent() {
        // two different mono packs, one silent track, no pack refs: either
        // pack could be chosen
        let packs = vec![
            AllocationPack {
                root_pack: pf(0),
                channels: vec![AllocationChannel { channel_format: cf(0), pack_formats: vec![pf(0)] }],
            },
            AllocationPack {
                root_pack: pf(1),
                channels: vec![AllocationChannel { channel_format: cf(1), pack_formats: vec![pf(1)] }],
            },
        ];

        let solutions = allocate_packs(&packs, &[], None, 1, 2);
        assert!(solutions.len() > 1);
    }

    #[test]
    fn test_chna_only_stereo() {
        let packs = vec![stereo_pack()];
        let tracks = vec![track(0, 0, 0), track(1, 0, 1)];

        let solutions = allocate_packs(&packs, &tracks, None, 0, 2);
        assert_eq!(solutions.len(), 1);
        assert_eq!(solutions[0].len(), 1);
    }

    #[test]
    fn test_chna_only_identical_pairs_ambiguous() {
        // four tracks forming two copies of the same stereo pack: the
        // pairing of lefts to rights is ambiguous
        let packs = vec![stereo_pack()];
        let tracks = vec![track(0, 0, 0), track(1, 0, 1), track(0, 0, 2), track(1, 0, 3)];

        let solutions = allocate_packs(&packs, &tracks, None, 0, 2);
        assert_eq!(solutions.len(), 2);
    }
}
