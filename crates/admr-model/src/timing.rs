//! Block format timing checks and fixes
//!
//! Within a channelFormat, the end of one block must line up with the rtime
//! of the next, and interpolation lengths must fit inside their blocks and
//! parent objects. With the block-duration-fix enabled these problems are
//! repaired (with warnings); otherwise they are reported as timing errors.

use admr_core::{Time, Warnings};

use crate::blocks::BlockFormats;
use crate::document::AdmDocument;
use crate::error::{ModelError, ModelResult};

/// Check (and with `fix`, repair) block format timing across the document.
pub fn check_block_format_timings(
    doc: &mut AdmDocument,
    fix: bool,
    warnings: &mut Warnings,
) -> ModelResult<()> {
    check_durations(doc, fix, warnings)?;
    check_interpolation_lengths(doc, fix, warnings)?;
    check_object_bounds(doc, fix, warnings)?;
    Ok(())
}

fn block_timing_error(id: &str, message: &str) -> ModelError {
    ModelError::Timing(format!("block format {}: {}", id, message))
}

fn check_durations(doc: &mut AdmDocument, fix: bool, warnings: &mut Warnings) -> ModelResult<()> {
    for channel in &mut doc.channel_formats {
        macro_rules! fix_blocks {
            ($blocks:expr) => {{
                let blocks = $blocks;
                for i in 0..blocks.len().saturating_sub(1) {
                    let (next_rtime, id, rtime, duration) = {
                        let next = &blocks[i + 1];
                        let cur = &blocks[i];
                        (next.rtime, cur.id.clone(), cur.rtime, cur.duration)
                    };

                    let (Some(rtime), Some(duration), Some(next_rtime)) =
                        (rtime, duration, next_rtime)
                    else {
                        continue;
                    };

                    let new_duration = next_rtime - rtime;
                    if new_duration != duration {
                        if !fix {
                            return Err(block_timing_error(
                                &id,
                                "duration does not match rtime of next block",
                            ));
                        }

                        warnings.warn(format!(
                            "{} duration of block format {} to match next rtime",
                            if new_duration > duration { "expanded" } else { "contracted" },
                            id,
                        ));
                        blocks[i].duration = Some(new_duration);
                    }
                }
            }};
        }

        match &mut channel.blocks {
            BlockFormats::Objects(blocks) => fix_blocks!(blocks),
            BlockFormats::DirectSpeakers(blocks) => fix_blocks!(blocks),
            BlockFormats::Hoa(blocks) => fix_blocks!(blocks),
            BlockFormats::Matrix(blocks) => fix_blocks!(blocks),
            BlockFormats::Binaural(blocks) => fix_blocks!(blocks),
        }
    }
    Ok(())
}

fn check_interpolation_lengths(
    doc: &mut AdmDocument,
    fix: bool,
    warnings: &mut Warnings,
) -> ModelResult<()> {
    for channel in &mut doc.channel_formats {
        let BlockFormats::Objects(blocks) = &mut channel.blocks else {
            continue;
        };

        for block in blocks {
            let (Some(duration), Some(interp)) =
                (block.duration, block.jump_position.interpolation_length)
            else {
                continue;
            };

            if block.jump_position.flag && interp > duration {
                if !fix {
                    return Err(block_timing_error(
                        &block.id,
                        "interpolationLength is greater than duration",
                    ));
                }

                warnings.warn(format!(
                    "contracted interpolationLength of block format {} to match duration",
                    block.id
                ));
                block.jump_position.interpolation_length = Some(duration);
            }
        }
    }
    Ok(())
}

fn check_object_bounds(
    doc: &mut AdmDocument,
    fix: bool,
    warnings: &mut Warnings,
) -> ModelResult<()> {
    // collect (channel index, object duration) pairs first; objects reference
    // channels through their packs
    let mut bounds: Vec<(usize, Time)> = Vec::new();

    for object in &doc.objects {
        let Some(duration) = object.duration else { continue };

        for &pack in &object.pack_formats {
            let mut stack = vec![pack];
            while let Some(pack) = stack.pop() {
                let pack = doc.pack_format(pack);
                stack.extend(&pack.pack_formats);
                for &channel in &pack.channel_formats {
                    bounds.push((channel.index(), duration));
                }
            }
        }
    }

    for (channel_idx, object_duration) in bounds {
        let channel = &mut doc.channel_formats[channel_idx];
        let BlockFormats::Objects(blocks) = &mut channel.blocks else {
            // bounds only need repair where interpolation is involved
            continue;
        };

        for block in blocks {
            match (block.rtime, block.duration) {
                (Some(rtime), Some(duration)) => {
                    let end = rtime + duration;
                    if end > object_duration {
                        let shift = end - object_duration;
                        if !fix {
                            return Err(block_timing_error(
                                &block.id,
                                "block ends after its audioObject",
                            ));
                        }
                        if shift >= duration {
                            return Err(block_timing_error(
                                &block.id,
                                "cannot contract block to fit its audioObject",
                            ));
                        }

                        warnings.warn(format!(
                            "advancing end of block format {} to match its audioObject",
                            block.id
                        ));
                        let new_duration = duration - shift;
                        block.duration = Some(new_duration);

                        if let Some(interp) = block.jump_position.interpolation_length {
                            if block.jump_position.flag && interp > new_duration {
                                warnings.warn(format!(
                                    "contracted interpolationLength of block format {} to fit its audioObject",
                                    block.id
                                ));
                                block.jump_position.interpolation_length = Some(new_duration);
                            }
                        }
                    }
                }
                (None, None) => {
                    if let Some(interp) = block.jump_position.interpolation_length {
                        if block.jump_position.flag && interp > object_duration {
                            if !fix {
                                return Err(block_timing_error(
                                    &block.id,
                                    "interpolationLength is longer than the audioObject",
                                ));
                            }
                            warnings.warn(format!(
                                "reduced interpolationLength of block format {} to match its audioObject",
                                block.id
                            ));
                            block.jump_position.interpolation_length = Some(object_duration);
                        }
                    }
                }
                _ => {
                    return Err(block_timing_error(
                        &block.id,
                        "rtime and duration must be used together",
                    ))
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blocks::{JumpPosition, ObjectPosition, ObjectsBlock};
    use crate::builder::AdmBuilder;

    fn block(id: &str, rtime: Time, duration: Time) -> ObjectsBlock {
        let mut b = ObjectsBlock::with_position(id, ObjectPosition::polar(0.0, 0.0, 1.0));
        b.rtime = Some(rtime);
        b.duration = Some(duration);
        b
    }

    fn doc_with_gap() -> AdmDocument {
        let mut b = AdmBuilder::new();
        let blocks = vec![
            block("AB_1", Time::ZERO, Time::new(1, 2)),
            // gap: previous block ends at 0.5, this starts at 0.6
            block("AB_2", Time::new(3, 5), Time::new(2, 5)),
        ];
        let object = b.add_objects_item(1, "test", blocks, 1).unwrap();
        b.add_default_programme(&[object]).unwrap();
        b.finish()
    }

    #[test]
    fn test_gap_is_error_without_fix() {
        let mut doc = doc_with_gap();
        let mut warnings = Warnings::new();
        let result = check_block_format_timings(&mut doc, false, &mut warnings);
        assert!(matches!(result, Err(ModelError::Timing(_))));
    }

    #[test]
    fn test_gap_fixed_with_flag() {
        let mut doc = doc_with_gap();
        let mut warnings = Warnings::new();
        check_block_format_timings(&mut doc, true, &mut warnings).unwrap();
        assert!(!warnings.is_empty());

        let BlockFormats::Objects(blocks) = &doc.channel_formats[0].blocks else {
            panic!("wrong block type")
        };
        // duration extended to reach the next rtime
        assert_eq!(blocks[0].duration, Some(Time::new(3, 5)));
    }

    #[test]
    fn test_interpolation_length_contracted() {
        let mut b = AdmBuilder::new();
        let mut bf = block("AB_1", Time::ZERO, Time::new(1, 2));
        bf.jump_position = JumpPosition {
            flag: true,
            interpolation_length: Some(Time::from_seconds(2)),
        };
        let object = b.add_objects_item(1, "test", vec![bf], 1).unwrap();
        b.add_default_programme(&[object]).unwrap();
        let mut doc = b.finish();

        let mut warnings = Warnings::new();
        assert!(check_block_format_timings(&mut doc, false, &mut warnings).is_err());

        check_block_format_timings(&mut doc, true, &mut warnings).unwrap();
        let BlockFormats::Objects(blocks) = &doc.channel_formats[0].blocks else {
            panic!("wrong block type")
        };
        assert_eq!(
            blocks[0].jump_position.interpolation_length,
            Some(Time::new(1, 2))
        );
    }
}
