use crate::utils::error::Result;
use crate::utils::geometry::Point3;

/// Classification of one input line.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Line {
    Point(Point3),
    Blank,
    Comment,
    Malformed,
}

/// Counters for one scan over a text buffer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanStats {
    pub lines: u64,
    pub points: u64,
    pub malformed: u64,
}

#[inline]
fn is_blank(byte: u8) -> bool {
    matches!(byte, b' ' | b'\t' | b'\r')
}

#[inline]
fn skip_blanks(bytes: &[u8]) -> &[u8] {
    let start = bytes.iter().position(|b| !is_blank(*b)).unwrap_or(bytes.len());
    &bytes[start..]
}

/// Parse one decimal float from the start of `bytes`.
///
/// Accepts an optional sign, digits, an optional fraction and an optional
/// exponent. `inf`/`nan` spellings are refused. Returns the value and the rest
/// of the slice.
#[inline]
pub fn parse_number(bytes: &[u8]) -> Option<(f64, &[u8])> {
    let unsigned = match bytes.first()? {
        b'+' | b'-' => &bytes[1..],
        _ => bytes,
    };
    match unsigned.first()? {
        b'0'..=b'9' | b'.' => {}
        _ => return None,
    }
    let (value, consumed) = fast_float2::parse_partial::<f64, _>(bytes).ok()?;
    Some((value, &bytes[consumed..]))
}

/// Classify a single line (without its trailing line feed).
pub fn parse_line(line: &[u8]) -> Line {
    let rest = skip_blanks(line);
    match rest.first() {
        None => return Line::Blank,
        Some(b'#') | Some(b'/') => return Line::Comment,
        Some(_) => {}
    }

    let mut rest = rest;
    let mut xyz = [0.0f64; 3];
    for (i, slot) in xyz.iter_mut().enumerate() {
        let Some((value, tail)) = parse_number(rest) else {
            return Line::Malformed;
        };
        // X and Y must be followed by whitespace; anything may follow Z
        if i < 2 && !tail.first().is_some_and(|b| is_blank(*b)) {
            return Line::Malformed;
        }
        *slot = value;
        rest = skip_blanks(tail);
    }
    Line::Point(Point3::new(xyz[0], xyz[1], xyz[2]))
}

/// Scan `buffer` as line-feed separated XYZ records, emitting each valid point.
///
/// Blank lines, comments and malformed lines never reach `emit`.
///
/// # Arguments
///
/// * `buffer` - The whole text source, usually a memory map.
/// * `emit` - Called once per accepted point, in line order.
///
/// # Returns
///
/// Line, point and malformed-line counts, or the first error from `emit`.
pub fn scan_lines<F>(buffer: &[u8], mut emit: F) -> Result<ScanStats>
where
    F: FnMut(Point3) -> Result<()>,
{
    let mut stats = ScanStats::default();
    if buffer.is_empty() {
        return Ok(stats);
    }
    let body = buffer.strip_suffix(b"\n").unwrap_or(buffer);
    for line in body.split(|b| *b == b'\n') {
        stats.lines += 1;
        match parse_line(line) {
            Line::Point(point) => {
                stats.points += 1;
                emit(point)?;
            }
            Line::Malformed => stats.malformed += 1,
            Line::Blank | Line::Comment => {}
        }
    }
    Ok(stats)
}
