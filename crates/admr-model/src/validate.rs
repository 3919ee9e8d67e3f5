//! Structural validation of ADM documents
//!
//! Catches the reference problems that would otherwise surface as panics or
//! nonsense output deep inside selection: cycles in the object and pack
//! nesting, type mismatches between packs and their channels, and malformed
//! matrix structures.

use crate::document::AdmDocument;
use crate::elements::{ObjectRef, PackFormatRef, TypeDefinition};
use crate::error::{ModelError, ModelResult};

/// Run all structural checks.
pub fn validate_structure(doc: &AdmDocument) -> ModelResult<()> {
    validate_object_loops(doc)?;
    validate_pack_loops(doc)?;
    validate_pack_channel_types(doc)?;
    validate_matrix_structure(doc)?;
    Ok(())
}

fn validate_object_loops(doc: &AdmDocument) -> ModelResult<()> {
    // DFS over the nesting graph; `visiting` marks the current path
    fn visit(
        doc: &AdmDocument,
        r: ObjectRef,
        visiting: &mut Vec<bool>,
        done: &mut Vec<bool>,
    ) -> ModelResult<()> {
        if done[r.index()] {
            return Ok(());
        }
        if visiting[r.index()] {
            return Err(ModelError::Reference(format!(
                "loop in audioObject references involving {}",
                doc.object(r).id
            )));
        }

        visiting[r.index()] = true;
        for &sub in &doc.object(r).objects {
            visit(doc, sub, visiting, done)?;
        }
        visiting[r.index()] = false;
        done[r.index()] = true;
        Ok(())
    }

    let mut visiting = vec![false; doc.objects.len()];
    let mut done = vec![false; doc.objects.len()];
    for r in doc.object_refs() {
        visit(doc, r, &mut visiting, &mut done)?;
    }
    Ok(())
}

fn validate_pack_loops(doc: &AdmDocument) -> ModelResult<()> {
    fn visit(
        doc: &AdmDocument,
        r: PackFormatRef,
        visiting: &mut Vec<bool>,
        done: &mut Vec<bool>,
    ) -> ModelResult<()> {
        if done[r.index()] {
            return Ok(());
        }
        if visiting[r.index()] {
            return Err(ModelError::Reference(format!(
                "loop in audioPackFormat references involving {}",
                doc.pack_format(r).id
            )));
        }

        visiting[r.index()] = true;
        for &sub in &doc.pack_format(r).pack_formats {
            visit(doc, sub, visiting, done)?;
        }
        visiting[r.index()] = false;
        done[r.index()] = true;
        Ok(())
    }

    let mut visiting = vec![false; doc.pack_formats.len()];
    let mut done = vec![false; doc.pack_formats.len()];
    for r in doc.pack_format_refs() {
        visit(doc, r, &mut visiting, &mut done)?;
    }
    Ok(())
}

fn validate_pack_channel_types(doc: &AdmDocument) -> ModelResult<()> {
    for pack in &doc.pack_formats {
        for &channel in &pack.channel_formats {
            let channel = doc.channel_format(channel);
            if channel.type_def != pack.type_def {
                return Err(ModelError::Validation(format!(
                    "audioPackFormat {} has type {} but references audioChannelFormat {} with type {}",
                    pack.id,
                    pack.type_def.name(),
                    channel.id,
                    channel.type_def.name(),
                )));
            }
        }

        for &sub in &pack.pack_formats {
            let sub = doc.pack_format(sub);
            if sub.type_def != pack.type_def {
                return Err(ModelError::Validation(format!(
                    "audioPackFormat {} has type {} but nests audioPackFormat {} with type {}",
                    pack.id,
                    pack.type_def.name(),
                    sub.id,
                    sub.type_def.name(),
                )));
            }
        }
    }
    Ok(())
}

fn validate_matrix_structure(doc: &AdmDocument) -> ModelResult<()> {
    for pack in &doc.pack_formats {
        if pack.type_def != TypeDefinition::Matrix {
            if pack.input_pack_format.is_some()
                || pack.output_pack_format.is_some()
                || !pack.encode_pack_formats.is_empty()
            {
                return Err(ModelError::Validation(format!(
                    "audioPackFormat {} is not a Matrix pack but has matrix references",
                    pack.id
                )));
            }
            continue;
        }

        if pack.input_pack_format.is_none() && pack.output_pack_format.is_none() {
            return Err(ModelError::Validation(format!(
                "Matrix audioPackFormat {} has neither an inputPackFormat nor an outputPackFormat",
                pack.id
            )));
        }

        // decode packs must name exactly one encode pack
        if pack.input_pack_format.is_none() && pack.encode_pack_formats.len() != 1 {
            return Err(ModelError::Validation(format!(
                "decode Matrix audioPackFormat {} must reference exactly one encodePackFormat",
                pack.id
            )));
        }

        // every channel must carry exactly one block with coefficients
        for &channel in &pack.channel_formats {
            let channel = doc.channel_format(channel);
            if channel.blocks.len() != 1 {
                return Err(ModelError::Validation(format!(
                    "Matrix audioChannelFormat {} must have exactly one audioBlockFormat",
                    channel.id
                )));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blocks::{BlockFormats, ObjectPosition, ObjectsBlock};
    use crate::builder::AdmBuilder;

    #[test]
    fn test_object_loop_detected() {
        let mut b = AdmBuilder::new();
        let a = b.add_object("AO_1001", "a").unwrap();
        let c = b.add_object("AO_1002", "b").unwrap();
        b.link_nested_object(a, c);
        b.link_nested_object(c, a);

        let doc = b.finish();
        assert!(matches!(
            validate_structure(&doc),
            Err(ModelError::Reference(_))
        ));
    }

    #[test]
    fn test_pack_type_mismatch_detected() {
        let mut b = AdmBuilder::new();
        let pack = b
            .add_pack_format("AP_00031001", "p", TypeDefinition::DirectSpeakers)
            .unwrap();
        let block = ObjectsBlock::with_position("AB_1", ObjectPosition::polar(0.0, 0.0, 1.0));
        let channel = b
            .add_channel_format(
                "AC_00031001",
                "c",
                TypeDefinition::Objects,
                BlockFormats::Objects(vec![block]),
            )
            .unwrap();
        b.link_pack_channel(pack, channel);

        let doc = b.finish();
        assert!(matches!(
            validate_structure(&doc),
            Err(ModelError::Validation(_))
        ));
    }

    #[test]
    fn test_valid_structure() {
        let mut b = AdmBuilder::new();
        let block = ObjectsBlock::with_position("AB_1", ObjectPosition::polar(0.0, 0.0, 1.0));
        let object = b.add_objects_item(1, "test", vec![block], 1).unwrap();
        b.add_default_programme(&[object]).unwrap();
        assert!(validate_structure(&b.finish()).is_ok());
    }
}
