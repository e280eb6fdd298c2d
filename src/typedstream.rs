//! Minimal reader for the NeXTSTEP `typedstream` archives stored in the
//! `attributedBody` column. Only the plain string of the root attributed
//! string is extracted; attribute runs are ignored.

use crate::error::DecodeError;

/// Class names that carry the message string.
const STRING_CLASSES: [&[u8]; 2] = [b"NSString", b"NSMutableString"];

/// Introduces a new type encoding of length one: `+`, a UTF-8 byte string.
const STRING_TYPE: [u8; 3] = [0x84, 0x01, b'+'];

const TAG_INT16: u8 = 0x81;
const TAG_INT32: u8 = 0x82;
const TAG_NEW: u8 = 0x84;
const TAG_NIL: u8 = 0x85;
/// Bytes from here up are references to earlier classes or objects.
const FIRST_REFERENCE: u8 = 0x92;

/// Extract the single string embedded in an attributed body.
pub fn decode_attributed_body(data: &[u8]) -> Result<String, DecodeError> {
    let objects = find_string_objects(data)?;

    match objects.as_slice() {
        [] => Err(DecodeError::NoString),
        [chain_end] => read_string_at(data, *chain_end),
        many => Err(DecodeError::MultipleStrings { count: many.len() }),
    }
}

/// Offsets just past the class chain of each newly declared string object.
///
/// A class is spelled out the first time it appears, together with any
/// superclass not seen before, so `NSMutableString` drags an `NSString`
/// declaration along with it. Names inside an already walked chain are not
/// separate objects. Later objects of a known class are back-references and
/// carry no name at all.
fn find_string_objects(data: &[u8]) -> Result<Vec<usize>, DecodeError> {
    let mut names = Vec::new();
    for name in STRING_CLASSES {
        let mut needle = Vec::with_capacity(name.len() + 1);
        needle.push(name.len() as u8);
        needle.extend_from_slice(name);

        let mut start = 0;
        while let Some(pos) = find(&data[start..], &needle) {
            names.push(start + pos);
            start += pos + needle.len();
        }
    }
    names.sort_unstable();

    let mut objects = Vec::new();
    let mut walked_to = 0;
    for name_start in names {
        if name_start < walked_to {
            continue;
        }
        walked_to = skip_class_chain(data, name_start)?;
        objects.push(walked_to);
    }

    Ok(objects)
}

/// Walks a class declaration from its length-prefixed name through its
/// inline superclasses. Returns the offset just past the chain.
fn skip_class_chain(data: &[u8], name_start: usize) -> Result<usize, DecodeError> {
    let mut offset = name_start;

    loop {
        let (name_len, name_at) = read_length(data, offset)?;
        let (_version, after_version) = read_length(data, name_at + name_len)?;

        match data.get(after_version) {
            // New superclass: class tag, then a new shared string for its name.
            Some(&TAG_NEW) => match data.get(after_version + 1) {
                Some(&TAG_NEW) => offset = after_version + 2,
                Some(&byte) => {
                    return Err(DecodeError::Malformed {
                        offset: after_version + 1,
                        byte,
                    })
                }
                None => {
                    return Err(DecodeError::Truncated {
                        offset: after_version + 1,
                    })
                }
            },
            Some(&byte) if byte == TAG_NIL || byte >= FIRST_REFERENCE => {
                return Ok(after_version + 1)
            }
            Some(&byte) => {
                return Err(DecodeError::Malformed {
                    offset: after_version,
                    byte,
                })
            }
            None => {
                return Err(DecodeError::Truncated {
                    offset: after_version,
                })
            }
        }
    }
}

fn read_string_at(data: &[u8], offset: usize) -> Result<String, DecodeError> {
    let type_end = offset + STRING_TYPE.len();
    match data.get(offset..type_end) {
        Some(tag) if tag == STRING_TYPE => {}
        Some(tag) => {
            return Err(DecodeError::Malformed {
                offset,
                byte: tag[0],
            })
        }
        None => return Err(DecodeError::Truncated { offset }),
    }

    let (len, body_start) = read_length(data, type_end)?;
    let body_end = body_start + len;
    let bytes = data
        .get(body_start..body_end)
        .ok_or(DecodeError::Truncated { offset: data.len() })?;

    String::from_utf8(bytes.to_vec()).map_err(|_| DecodeError::InvalidUtf8)
}

/// Reads a typedstream integer used as a byte count. Returns the value and
/// the offset of the first byte after it.
fn read_length(data: &[u8], offset: usize) -> Result<(usize, usize), DecodeError> {
    let tag = *data.get(offset).ok_or(DecodeError::Truncated { offset })?;

    match tag {
        TAG_INT16 => {
            let raw = data
                .get(offset + 1..offset + 3)
                .ok_or(DecodeError::Truncated { offset: offset + 1 })?;
            Ok((u16::from_le_bytes([raw[0], raw[1]]) as usize, offset + 3))
        }
        TAG_INT32 => {
            let raw = data
                .get(offset + 1..offset + 5)
                .ok_or(DecodeError::Truncated { offset: offset + 1 })?;
            let value = u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]);
            Ok((value as usize, offset + 5))
        }
        byte if byte < 0x80 => Ok((byte as usize, offset + 1)),
        byte => Err(DecodeError::Malformed { offset, byte }),
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    const HEADER: &[u8] = b"\x04\x0bstreamtyped\x81\xe8\x03\x84\x01@\x84\x84\x84\x12NSAttributedString\x00\x84\x84\x08NSObject\x00\x85\x92\x84\x84\x84";
    const TRAILER: &[u8] = b"\x86\x84\x02iI\x01\x05\x92\x84\x84\x84\x0cNSDictionary\x00\x94\x84\x01i\x01\x92\x84\x96\x96\x1d__kIMMessagePartAttributeName\x86\x86";

    fn encode_len(out: &mut Vec<u8>, len: usize) {
        if len < 0x80 {
            out.push(len as u8);
        } else if len <= u16::MAX as usize {
            out.push(TAG_INT16);
            out.extend_from_slice(&(len as u16).to_le_bytes());
        } else {
            out.push(TAG_INT32);
            out.extend_from_slice(&(len as u32).to_le_bytes());
        }
    }

    /// `NSString` with its superclass `NSObject` already known.
    const NSSTRING_CLASS: &[u8] = b"\x08NSString\x01\x94";
    /// `NSMutableString` declared together with its `NSString` superclass.
    const NSMUTABLESTRING_CLASS: &[u8] = b"\x0fNSMutableString\x01\x84\x84\x08NSString\x01\x94";

    fn string_object(out: &mut Vec<u8>, class: &[u8], text: &str) {
        out.extend_from_slice(class);
        out.extend_from_slice(&STRING_TYPE);
        encode_len(out, text.len());
        out.extend_from_slice(text.as_bytes());
    }

    /// Builds an attributed body the way Messages writes a plain text message.
    pub(crate) fn attributed_body(text: &str) -> Vec<u8> {
        let mut out = HEADER.to_vec();
        string_object(&mut out, NSSTRING_CLASS, text);
        out.extend_from_slice(TRAILER);
        out
    }

    #[test]
    fn test_decodes_short_string() {
        let body = attributed_body("me!");
        assert_eq!(decode_attributed_body(&body).unwrap(), "me!");
    }

    #[test]
    fn test_decodes_multibyte_and_long_strings() {
        let text = "héllo 👋 ".repeat(40);
        assert!(text.len() > 0x80);
        let body = attributed_body(&text);
        assert_eq!(decode_attributed_body(&body).unwrap(), text);
    }

    #[test]
    fn test_decodes_mutable_string() {
        let mut body = HEADER.to_vec();
        string_object(&mut body, NSMUTABLESTRING_CLASS, "not me");
        body.extend_from_slice(TRAILER);
        assert_eq!(decode_attributed_body(&body).unwrap(), "not me");
    }

    #[test]
    fn test_superclass_declared_inline_with_new_reference() {
        let mut body = HEADER.to_vec();
        body.extend_from_slice(b"\x0fNSMutableString\x01\x84\x84\x08NSString\x01\x95\x84\x01+\x06not me");
        assert_eq!(decode_attributed_body(&body).unwrap(), "not me");
    }

    #[test]
    fn test_string_back_references_are_not_counted() {
        let mut body = attributed_body("me");
        // Another attribute value of the already declared string class.
        body.extend_from_slice(b"\x92\x84\x96\x96\x05hello\x86");
        assert_eq!(decode_attributed_body(&body).unwrap(), "me");
    }

    #[test]
    fn test_no_string_is_an_error() {
        let mut body = HEADER.to_vec();
        body.extend_from_slice(TRAILER);
        assert_eq!(decode_attributed_body(&body), Err(DecodeError::NoString));
    }

    #[test]
    fn test_multiple_strings_is_an_error() {
        let mut body = HEADER.to_vec();
        string_object(&mut body, NSSTRING_CLASS, "one");
        body.extend_from_slice(b"\x86\x84\x84\x84");
        string_object(&mut body, b"\x0fNSMutableString\x01\x96", "two");
        assert_eq!(
            decode_attributed_body(&body),
            Err(DecodeError::MultipleStrings { count: 2 })
        );
    }

    #[test]
    fn test_truncated_body() {
        let mut body = attributed_body("a fairly long message");
        body.truncate(HEADER.len() + 16);
        assert!(matches!(
            decode_attributed_body(&body),
            Err(DecodeError::Truncated { .. })
        ));
    }

    #[test]
    fn test_invalid_utf8() {
        let mut body = HEADER.to_vec();
        body.extend_from_slice(b"\x08NSString\x01\x94\x84\x01+\x02\xff\xfe");
        assert_eq!(decode_attributed_body(&body), Err(DecodeError::InvalidUtf8));
    }
}
