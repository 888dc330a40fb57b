//! Content stream tokenizer.
//!
//! Parses a page's content stream bytes into a sequence of operators.
//! Content streams use postfix notation where operands precede the
//! operator:
//!
//! ```text
//! BT
//!   /F1 12 Tf
//!   100 700 Td
//!   (Hello, World!) Tj
//! ET
//! ```
//!
//! Two things distinguish this tokenizer from a generic one: every
//! operator keeps its absolute byte span (so untouched operators can be
//! re-emitted verbatim), and every string operand keeps its literal kind
//! (parenthesized vs hex vs array element), which the planner needs to
//! decide when runs can be merged.

use crate::content::operators::{LiteralKind, Operator, RawOperator, StringOperand, TextElement};
use crate::error::Result;
use nom::IResult;
use nom::bytes::complete::take_while1;

/// A parsed operand, before it is folded into a typed [`Operator`].
#[derive(Debug, Clone, PartialEq)]
enum Operand {
    Number(f32),
    Name(String),
    Str(StringOperand),
    Array(Vec<TextElement>),
    /// Dictionaries and other operand syntax the engine does not interpret
    Opaque,
}

/// Parse a content stream into a sequence of span-annotated operators.
///
/// The tokenizer is lenient: a byte it cannot make sense of is skipped
/// with a debug log, the way real-world malformed streams are usually
/// handled, rather than failing the whole page.
pub fn parse_content_stream(data: &[u8]) -> Result<Vec<RawOperator>> {
    let mut operators = Vec::new();
    let mut pos = 0usize;

    while pos < data.len() {
        pos = skip_whitespace_and_comments(data, pos);
        if pos >= data.len() {
            break;
        }

        match parse_operator_with_operands(data, pos) {
            Ok((next, op)) => {
                operators.push(RawOperator { op, span: pos..next });
                pos = next;
            },
            Err(_) => {
                log::debug!("skipping unparseable content stream byte at offset {}", pos);
                pos += 1;
            },
        }
    }

    Ok(operators)
}

/// Parse one operator together with its preceding operands.
///
/// Returns the absolute offset just past the operator keyword.
fn parse_operator_with_operands(data: &[u8], start: usize) -> std::result::Result<(usize, Operator), ()> {
    let mut operands: Vec<Operand> = Vec::new();
    let mut pos = start;

    loop {
        pos = skip_whitespace_and_comments(data, pos);
        if pos >= data.len() {
            return Err(());
        }

        let byte = data[pos];
        if is_operator_start(byte) && !is_keyword_operand(data, pos) {
            let (next, name) = parse_operator_name(data, pos)?;

            // Inline images carry raw binary data; skip to the closing EI
            // and pass the whole sequence through untouched.
            if name == "BI" {
                let end = skip_inline_image(data, next);
                return Ok((end, Operator::Other { name }));
            }

            return Ok((next, build_operator(&name, operands)));
        }

        let (next, operand) = parse_operand(data, pos)?;
        operands.push(operand);
        pos = next;
    }
}

/// Check if a byte could start an operator keyword.
fn is_operator_start(byte: u8) -> bool {
    byte.is_ascii_alphabetic() || byte == b'\'' || byte == b'"'
}

/// `true`, `false` and `null` are operands, not operators.
fn is_keyword_operand(data: &[u8], pos: usize) -> bool {
    for kw in [&b"true"[..], b"false", b"null"] {
        if data[pos..].starts_with(kw) {
            let end = pos + kw.len();
            if end >= data.len() || is_whitespace_or_delimiter(data[end]) {
                return true;
            }
        }
    }
    false
}

/// Parse an operator keyword (1-3 letters, plus `'`, `"`, and `T*`).
fn parse_operator_name(data: &[u8], pos: usize) -> std::result::Result<(usize, String), ()> {
    let input = &data[pos..];
    let parsed: IResult<&[u8], &[u8]> =
        take_while1(|c: u8| c.is_ascii_alphanumeric() || c == b'\'' || c == b'"' || c == b'*')(input);
    let (rest, name_bytes) = parsed.map_err(|_| ())?;
    let name = std::str::from_utf8(name_bytes).map_err(|_| ())?;
    Ok((pos + (input.len() - rest.len()), name.to_string()))
}

/// Parse one operand starting at `pos`.
fn parse_operand(data: &[u8], pos: usize) -> std::result::Result<(usize, Operand), ()> {
    match data[pos] {
        b'/' => parse_name(data, pos),
        b'(' => {
            let (next, s) = parse_literal_string(data, pos, LiteralKind::Text)?;
            Ok((next, Operand::Str(s)))
        },
        b'<' => {
            if data.len() > pos + 1 && data[pos + 1] == b'<' {
                let next = skip_dictionary(data, pos)?;
                Ok((next, Operand::Opaque))
            } else {
                let (next, s) = parse_hex_string(data, pos)?;
                Ok((next, Operand::Str(s)))
            }
        },
        b'[' => parse_array(data, pos),
        b'+' | b'-' | b'.' | b'0'..=b'9' => parse_number(data, pos),
        b't' | b'f' | b'n' => {
            // true / false / null keywords
            for kw in [&b"true"[..], b"false", b"null"] {
                if data[pos..].starts_with(kw) {
                    return Ok((pos + kw.len(), Operand::Opaque));
                }
            }
            Err(())
        },
        _ => Err(()),
    }
}

fn parse_name(data: &[u8], pos: usize) -> std::result::Result<(usize, Operand), ()> {
    let mut end = pos + 1;
    while end < data.len() && !is_whitespace_or_delimiter(data[end]) {
        end += 1;
    }
    let name = std::str::from_utf8(&data[pos + 1..end]).map_err(|_| ())?;
    Ok((end, Operand::Name(name.to_string())))
}

fn parse_number(data: &[u8], pos: usize) -> std::result::Result<(usize, Operand), ()> {
    let mut end = pos;
    if matches!(data[end], b'+' | b'-') {
        end += 1;
    }
    let digits_start = end;
    while end < data.len() && (data[end].is_ascii_digit() || data[end] == b'.') {
        end += 1;
    }
    if end == digits_start {
        return Err(());
    }
    let text = std::str::from_utf8(&data[pos..end]).map_err(|_| ())?;
    let value: f32 = text.parse().map_err(|_| ())?;
    Ok((end, Operand::Number(value)))
}

/// Parse a parenthesized literal string, resolving escapes and balanced
/// nested parentheses.
fn parse_literal_string(
    data: &[u8],
    pos: usize,
    kind: LiteralKind,
) -> std::result::Result<(usize, StringOperand), ()> {
    debug_assert_eq!(data[pos], b'(');
    let body_start = pos + 1;
    let mut bytes = Vec::new();
    let mut depth = 1usize;
    let mut i = body_start;

    while i < data.len() {
        match data[i] {
            b'\\' => {
                if i + 1 >= data.len() {
                    return Err(());
                }
                i += 1;
                match data[i] {
                    b'n' => bytes.push(b'\n'),
                    b'r' => bytes.push(b'\r'),
                    b't' => bytes.push(b'\t'),
                    b'b' => bytes.push(0x08),
                    b'f' => bytes.push(0x0C),
                    b'(' => bytes.push(b'('),
                    b')' => bytes.push(b')'),
                    b'\\' => bytes.push(b'\\'),
                    b'\r' => {
                        // line continuation, swallow an optional LF
                        if i + 1 < data.len() && data[i + 1] == b'\n' {
                            i += 1;
                        }
                    },
                    b'\n' => {},
                    b'0'..=b'7' => {
                        let mut value = (data[i] - b'0') as u32;
                        let mut consumed = 1;
                        while consumed < 3
                            && i + 1 < data.len()
                            && (b'0'..=b'7').contains(&data[i + 1])
                        {
                            i += 1;
                            consumed += 1;
                            value = value * 8 + (data[i] - b'0') as u32;
                        }
                        bytes.push((value & 0xFF) as u8);
                    },
                    other => bytes.push(other),
                }
                i += 1;
            },
            b'(' => {
                depth += 1;
                bytes.push(b'(');
                i += 1;
            },
            b')' => {
                depth -= 1;
                if depth == 0 {
                    return Ok((
                        i + 1,
                        StringOperand {
                            bytes,
                            kind,
                            range: body_start..i,
                        },
                    ));
                }
                bytes.push(b')');
                i += 1;
            },
            other => {
                bytes.push(other);
                i += 1;
            },
        }
    }
    Err(())
}

/// Parse a hex string `<48656C6C6F>`. An odd final digit is padded with 0
/// per the PDF spec.
fn parse_hex_string(data: &[u8], pos: usize) -> std::result::Result<(usize, StringOperand), ()> {
    debug_assert_eq!(data[pos], b'<');
    let body_start = pos + 1;
    let mut digits = Vec::new();
    let mut i = body_start;

    while i < data.len() {
        match data[i] {
            b'>' => {
                if digits.len() % 2 == 1 {
                    digits.push(b'0');
                }
                let bytes = digits
                    .chunks(2)
                    .map(|pair| {
                        let hi = hex_value(pair[0])?;
                        let lo = hex_value(pair[1])?;
                        Some(hi * 16 + lo)
                    })
                    .collect::<Option<Vec<u8>>>()
                    .ok_or(())?;
                return Ok((
                    i + 1,
                    StringOperand {
                        bytes,
                        kind: LiteralKind::Byte,
                        range: body_start..i,
                    },
                ));
            },
            c if c.is_ascii_hexdigit() => {
                digits.push(c);
                i += 1;
            },
            c if is_whitespace(c) => i += 1,
            _ => return Err(()),
        }
    }
    Err(())
}

fn hex_value(digit: u8) -> Option<u8> {
    (digit as char).to_digit(16).map(|v| v as u8)
}

/// Parse a TJ-style array of strings and numeric adjustments.
fn parse_array(data: &[u8], pos: usize) -> std::result::Result<(usize, Operand), ()> {
    debug_assert_eq!(data[pos], b'[');
    let mut elements = Vec::new();
    let mut i = pos + 1;

    loop {
        i = skip_whitespace_and_comments(data, i);
        if i >= data.len() {
            return Err(());
        }
        match data[i] {
            b']' => return Ok((i + 1, Operand::Array(elements))),
            b'(' => {
                let (next, s) = parse_literal_string(data, i, LiteralKind::Array)?;
                elements.push(TextElement::String(s));
                i = next;
            },
            b'<' => {
                let (next, s) = parse_hex_string(data, i)?;
                elements.push(TextElement::String(s));
                i = next;
            },
            b'+' | b'-' | b'.' | b'0'..=b'9' => {
                let (next, operand) = parse_number(data, i)?;
                if let Operand::Number(n) = operand {
                    elements.push(TextElement::Offset(n));
                }
                i = next;
            },
            _ => return Err(()),
        }
    }
}

/// Skip a `<< ... >>` dictionary, respecting nesting and string syntax.
fn skip_dictionary(data: &[u8], pos: usize) -> std::result::Result<usize, ()> {
    let mut depth = 0usize;
    let mut i = pos;
    while i < data.len() {
        if data[i..].starts_with(b"<<") {
            depth += 1;
            i += 2;
        } else if data[i..].starts_with(b">>") {
            depth -= 1;
            i += 2;
            if depth == 0 {
                return Ok(i);
            }
        } else if data[i] == b'(' {
            let (next, _) = parse_literal_string(data, i, LiteralKind::Text)?;
            i = next;
        } else {
            i += 1;
        }
    }
    Err(())
}

/// Skip past an inline image's binary payload to the byte after `EI`.
///
/// `EI` must be preceded by whitespace and followed by whitespace or end
/// of stream, since the bytes "EI" can occur inside the image data.
fn skip_inline_image(data: &[u8], pos: usize) -> usize {
    let mut i = pos;
    while i + 2 < data.len() {
        if is_whitespace(data[i]) && &data[i + 1..i + 3] == b"EI" {
            let after = i + 3;
            if after >= data.len() || is_whitespace_or_delimiter(data[after]) {
                return after;
            }
        }
        i += 1;
    }
    data.len()
}

fn skip_whitespace_and_comments(data: &[u8], mut pos: usize) -> usize {
    while pos < data.len() {
        if is_whitespace(data[pos]) {
            pos += 1;
        } else if data[pos] == b'%' {
            while pos < data.len() && data[pos] != b'\n' && data[pos] != b'\r' {
                pos += 1;
            }
        } else {
            break;
        }
    }
    pos
}

/// Check if a byte is PDF whitespace (space, tab, CR, LF, FF, NUL).
fn is_whitespace(byte: u8) -> bool {
    matches!(byte, b' ' | b'\t' | b'\r' | b'\n' | b'\x0C' | b'\0')
}

/// Check if a byte is whitespace or a PDF delimiter.
fn is_whitespace_or_delimiter(byte: u8) -> bool {
    is_whitespace(byte)
        || matches!(byte, b'(' | b')' | b'<' | b'>' | b'[' | b']' | b'{' | b'}' | b'/' | b'%')
}

/// Fold collected operands into a typed operator.
fn build_operator(name: &str, operands: Vec<Operand>) -> Operator {
    match name {
        "Td" => Operator::Td {
            tx: get_number(&operands, 0).unwrap_or(0.0),
            ty: get_number(&operands, 1).unwrap_or(0.0),
        },
        "TD" => Operator::TD {
            tx: get_number(&operands, 0).unwrap_or(0.0),
            ty: get_number(&operands, 1).unwrap_or(0.0),
        },
        "Tm" => Operator::Tm {
            a: get_number(&operands, 0).unwrap_or(1.0),
            b: get_number(&operands, 1).unwrap_or(0.0),
            c: get_number(&operands, 2).unwrap_or(0.0),
            d: get_number(&operands, 3).unwrap_or(1.0),
            e: get_number(&operands, 4).unwrap_or(0.0),
            f: get_number(&operands, 5).unwrap_or(0.0),
        },
        "T*" => Operator::TStar,

        "Tj" => match get_string(&operands, 0) {
            Some(text) => Operator::Tj { text },
            None => Operator::Other {
                name: name.to_string(),
            },
        },
        "TJ" => {
            let array = operands
                .into_iter()
                .find_map(|operand| match operand {
                    Operand::Array(elements) => Some(elements),
                    _ => None,
                })
                .unwrap_or_default();
            Operator::TJ { array }
        },
        "'" => match get_string(&operands, 0) {
            Some(text) => Operator::Quote { text },
            None => Operator::Other {
                name: name.to_string(),
            },
        },
        "\"" => match get_string(&operands, 2) {
            Some(text) => Operator::DoubleQuote {
                word_space: get_number(&operands, 0).unwrap_or(0.0),
                char_space: get_number(&operands, 1).unwrap_or(0.0),
                text,
            },
            None => Operator::Other {
                name: name.to_string(),
            },
        },

        "Tc" => Operator::Tc {
            char_space: get_number(&operands, 0).unwrap_or(0.0),
        },
        "Tw" => Operator::Tw {
            word_space: get_number(&operands, 0).unwrap_or(0.0),
        },
        "Tz" => Operator::Tz {
            scale: get_number(&operands, 0).unwrap_or(100.0),
        },
        "TL" => Operator::TL {
            leading: get_number(&operands, 0).unwrap_or(0.0),
        },
        "Tf" => Operator::Tf {
            font: get_name(&operands, 0).unwrap_or_default(),
            size: get_number(&operands, 1).unwrap_or(0.0),
        },
        "Tr" => Operator::Tr {
            render: get_number(&operands, 0).unwrap_or(0.0) as u8,
        },
        "Ts" => Operator::Ts {
            rise: get_number(&operands, 0).unwrap_or(0.0),
        },

        "q" => Operator::SaveState,
        "Q" => Operator::RestoreState,
        "cm" => Operator::Cm {
            a: get_number(&operands, 0).unwrap_or(1.0),
            b: get_number(&operands, 1).unwrap_or(0.0),
            c: get_number(&operands, 2).unwrap_or(0.0),
            d: get_number(&operands, 3).unwrap_or(1.0),
            e: get_number(&operands, 4).unwrap_or(0.0),
            f: get_number(&operands, 5).unwrap_or(0.0),
        },

        "BT" => Operator::BeginText,
        "ET" => Operator::EndText,

        _ => Operator::Other {
            name: name.to_string(),
        },
    }
}

fn get_number(operands: &[Operand], index: usize) -> Option<f32> {
    operands.get(index).and_then(|operand| match operand {
        Operand::Number(n) => Some(*n),
        _ => None,
    })
}

fn get_name(operands: &[Operand], index: usize) -> Option<String> {
    operands.get(index).and_then(|operand| match operand {
        Operand::Name(name) => Some(name.clone()),
        _ => None,
    })
}

fn get_string(operands: &[Operand], index: usize) -> Option<StringOperand> {
    operands.get(index).and_then(|operand| match operand {
        Operand::Str(s) => Some(s.clone()),
        _ => None,
    })
}
