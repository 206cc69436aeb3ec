//! Small lopdf helpers shared by the lopdf-backed strategies.

use crate::error::ExtractError;
use lopdf::{Dictionary, Document, Object, ObjectId};

/// Integer or real operand as `f32`.
pub(crate) fn number(obj: &Object) -> Option<f32> {
    match obj {
        Object::Integer(i) => Some(*i as f32),
        Object::Real(r) => Some(*r),
        _ => None,
    }
}

/// Follows a reference once; returns other objects unchanged.
pub(crate) fn resolve<'a>(doc: &'a Document, obj: &'a Object) -> Result<&'a Object, ExtractError> {
    match obj {
        Object::Reference(id) => Ok(doc.get_object(*id)?),
        other => Ok(other),
    }
}

/// Looks up `key` on the page, walking up `/Parent` when the page inherits it.
pub(crate) fn inherited<'a>(
    doc: &'a Document,
    page_id: ObjectId,
    key: &[u8],
) -> Result<Option<&'a Object>, ExtractError> {
    let mut current = page_id;
    // Guards against cyclic /Parent chains in broken files.
    for _ in 0..64 {
        let dict = doc.get_object(current)?.as_dict()?;
        if let Ok(value) = dict.get(key) {
            return Ok(Some(value));
        }
        match dict.get(b"Parent") {
            Ok(parent) => current = parent.as_reference()?,
            Err(_) => return Ok(None),
        }
    }
    Ok(None)
}

/// The page's `/Resources` dictionary, or `None` when it has none.
pub(crate) fn page_resources(
    doc: &Document,
    page_id: ObjectId,
) -> Result<Option<&Dictionary>, ExtractError> {
    match inherited(doc, page_id, b"Resources")? {
        Some(obj) => Ok(Some(resolve(doc, obj)?.as_dict()?)),
        None => Ok(None),
    }
}

/// The `/XObject` sub-dictionary of a resources dictionary.
pub(crate) fn xobjects<'a>(
    doc: &'a Document,
    resources: Option<&'a Dictionary>,
) -> Option<&'a Dictionary> {
    let obj = resources?.get(b"XObject").ok()?;
    resolve(doc, obj).ok()?.as_dict().ok()
}

/// Concatenated, decompressed content streams of a page.
pub(crate) fn page_content(doc: &Document, page_id: ObjectId) -> Result<Vec<u8>, ExtractError> {
    let page = doc.get_object(page_id)?.as_dict()?;
    let contents = match page.get(b"Contents") {
        Ok(obj) => obj,
        Err(_) => return Ok(Vec::new()),
    };

    match resolve(doc, contents)? {
        Object::Stream(stream) => stream_bytes(stream),
        Object::Array(items) => {
            let mut content = Vec::new();
            for item in items {
                let stream = resolve(doc, item)?.as_stream()?;
                if !content.is_empty() {
                    content.push(b'\n');
                }
                content.extend_from_slice(&stream_bytes(stream)?);
            }
            Ok(content)
        }
        _ => Ok(Vec::new()),
    }
}

/// Stream data with filters applied (or raw when unfiltered).
pub(crate) fn stream_bytes(stream: &lopdf::Stream) -> Result<Vec<u8>, ExtractError> {
    if stream.dict.get(b"Filter").is_ok() {
        Ok(stream.decompressed_content()?)
    } else {
        Ok(stream.content.clone())
    }
}

/// Four-number rectangle array (e.g. `/MediaBox`).
pub(crate) fn rect(obj: &Object) -> Option<[f32; 4]> {
    let arr = obj.as_array().ok()?;
    if arr.len() != 4 {
        return None;
    }
    Some([
        number(&arr[0])?,
        number(&arr[1])?,
        number(&arr[2])?,
        number(&arr[3])?,
    ])
}

/// Name operand as a UTF-8 string.
pub(crate) fn name(obj: &Object) -> Option<String> {
    obj.as_name()
        .ok()
        .map(|n| String::from_utf8_lossy(n).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use lopdf::dictionary;

    #[test]
    fn number_accepts_int_and_real() {
        assert_eq!(number(&Object::Integer(3)), Some(3.0));
        assert_eq!(number(&Object::Real(1.5)), Some(1.5));
        assert_eq!(number(&Object::Null), None);
    }

    #[test]
    fn rect_requires_four_numbers() {
        let ok = Object::Array(vec![0.into(), 0.into(), 612.into(), 792.into()]);
        assert_eq!(rect(&ok), Some([0.0, 0.0, 612.0, 792.0]));
        let short = Object::Array(vec![0.into(), 0.into()]);
        assert_eq!(rect(&short), None);
    }

    #[test]
    fn inherited_walks_parent_chain() {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
        });
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => vec![Object::from(page_id)],
                "Count" => 1i64,
                "Rotate" => 90i64,
            }),
        );

        let rotate = inherited(&doc, page_id, b"Rotate").unwrap();
        assert_eq!(rotate.and_then(|o| o.as_i64().ok()), Some(90));
        assert!(inherited(&doc, page_id, b"CropBox").unwrap().is_none());
    }
}
