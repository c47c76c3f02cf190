//! APRS-IS line parsing.
//!
//! A line is `SOURCE>DEST[,PATH...]:BODY`. Only the position formats needed to
//! decide liveness are decoded:
//! - `!` `=`: position without timestamp, uncompressed or compressed
//! - `/` `@`: position with a 7 character timestamp
//! - `` ` `` `'`: Mic-E, latitude carried in the destination field
//!
//! Everything else parses into a valid frame without a position.

use liveness::{Observation, Position, Symbol};

/// Split a raw line into an observation.
pub fn parse_line(line: &str) -> Observation {
    let line = line.trim_end_matches(['\r', '\n']);

    let Some(gt) = line.find('>') else {
        return Observation::invalid(line);
    };
    let Some(colon) = line[gt..].find(':').map(|i| gt + i) else {
        return Observation::invalid(line);
    };

    let source = &line[..gt];
    let path = &line[gt + 1..colon];
    let body = &line[colon + 1..];
    if body.is_empty() {
        return Observation::invalid(line);
    }

    let destination = path.split(',').next().unwrap_or_default();

    Observation {
        source: source.to_string(),
        frame_valid: true,
        position: parse_position(destination, body),
        raw: line.to_string(),
    }
}

/// Decode the position carried in an information field, if any.
pub fn parse_position(destination: &str, body: &str) -> Option<Position> {
    let data = body.as_bytes();
    match data.first()? {
        b'!' | b'=' => parse_plain(&data[1..]),
        b'/' | b'@' => parse_plain(data.get(8..)?),
        b'`' | b'\'' => parse_mic_e(destination, data),
        _ => None,
    }
}

fn parse_plain(data: &[u8]) -> Option<Position> {
    match data.first()? {
        b'0'..=b'9' | b' ' => parse_uncompressed(data),
        _ => parse_compressed(data),
    }
}

/// `DDMM.hhN` table `DDDMM.hhW` code
fn parse_uncompressed(data: &[u8]) -> Option<Position> {
    if data.len() < 19 {
        return None;
    }

    let latitude = parse_coordinate(&data[0..7], 2, data[7], b'N', b'S', 90.0)?;
    let longitude = parse_coordinate(&data[9..17], 3, data[17], b'E', b'W', 180.0)?;

    Some(Position {
        latitude,
        longitude,
        symbol: Symbol::new(data[8] as char, data[18] as char),
    })
}

/// Degrees and decimal minutes with optional ambiguity spaces
fn parse_coordinate(
    digits: &[u8],
    degree_digits: usize,
    hemisphere: u8,
    positive: u8,
    negative: u8,
    limit: f64,
) -> Option<f64> {
    let sign = match hemisphere.to_ascii_uppercase() {
        h if h == positive => 1.0,
        h if h == negative => -1.0,
        _ => return None,
    };
    if digits.get(degree_digits + 2) != Some(&b'.') {
        return None;
    }

    let text: String = digits
        .iter()
        .map(|&b| if b == b' ' { '0' } else { b as char })
        .collect();
    if !text
        .bytes()
        .enumerate()
        .all(|(i, b)| b.is_ascii_digit() || i == degree_digits + 2)
    {
        return None;
    }

    let degrees: f64 = text[..degree_digits].parse().ok()?;
    let minutes: f64 = text[degree_digits..].parse().ok()?;
    if minutes >= 60.0 {
        return None;
    }

    let value = degrees + minutes / 60.0;
    (value <= limit).then_some(sign * value)
}

fn base91(data: &[u8]) -> Option<f64> {
    data.iter().try_fold(0.0, |acc, &b| {
        (33..=124).contains(&b).then(|| acc * 91.0 + f64::from(b - 33))
    })
}

/// table `YYYY` `XXXX` code `cs` type
fn parse_compressed(data: &[u8]) -> Option<Position> {
    if data.len() < 13 {
        return None;
    }

    let table = match data[0] {
        b @ b'a'..=b'j' => (b - b'a' + b'0') as char,
        b @ (b'/' | b'\\' | b'A'..=b'Z') => b as char,
        _ => return None,
    };

    let latitude = 90.0 - base91(&data[1..5])? / 380_926.0;
    let longitude = -180.0 + base91(&data[5..9])? / 190_463.0;
    if !(-90.0..=90.0).contains(&latitude) || !(-180.0..=180.0).contains(&longitude) {
        return None;
    }

    Some(Position {
        latitude,
        longitude,
        symbol: Symbol::new(table, data[9] as char),
    })
}

/// Latitude digit encoded in a Mic-E destination character; `None` means ambiguous
fn mic_e_digit(b: u8) -> Option<Option<u8>> {
    match b {
        b'0'..=b'9' => Some(Some(b - b'0')),
        b'A'..=b'J' => Some(Some(b - b'A')),
        b'P'..=b'Y' => Some(Some(b - b'P')),
        b'K' | b'L' | b'Z' => Some(None),
        _ => None,
    }
}

fn parse_mic_e(destination: &str, data: &[u8]) -> Option<Position> {
    let dest = destination.split('-').next()?.as_bytes();
    if dest.len() < 6 || data.len() < 9 {
        return None;
    }

    let mut lat_digits = [0u8; 6];
    for (slot, &b) in lat_digits.iter_mut().zip(&dest[..6]) {
        *slot = mic_e_digit(b)?.unwrap_or(0);
    }
    let lat_degrees = f64::from(lat_digits[0] * 10 + lat_digits[1]);
    let lat_minutes = f64::from(lat_digits[2] * 10 + lat_digits[3])
        + f64::from(lat_digits[4] * 10 + lat_digits[5]) / 100.0;

    // Message bits: digits and L are "0", P through Z are "1"
    let flag = |b: u8| b >= b'P';
    let north = flag(dest[3]);
    let lon_offset = if flag(dest[4]) { 100 } else { 0 };
    let west = flag(dest[5]);

    let mut lon_degrees = i32::from(data[1]) - 28 + lon_offset;
    if (180..=189).contains(&lon_degrees) {
        lon_degrees -= 80;
    } else if (190..=199).contains(&lon_degrees) {
        lon_degrees -= 190;
    }
    let mut lon_minutes = i32::from(data[2]) - 28;
    if lon_minutes >= 60 {
        lon_minutes -= 60;
    }
    let lon_hundredths = i32::from(data[3]) - 28;

    if !(0..=180).contains(&lon_degrees)
        || !(0..60).contains(&lon_minutes)
        || !(0..100).contains(&lon_hundredths)
        || lat_degrees > 90.0
        || lat_minutes >= 60.0
    {
        return None;
    }

    let latitude = lat_degrees + lat_minutes / 60.0;
    let longitude =
        f64::from(lon_degrees) + (f64::from(lon_minutes) + f64::from(lon_hundredths) / 100.0) / 60.0;

    Some(Position {
        latitude: if north { latitude } else { -latitude },
        longitude: if west { -longitude } else { longitude },
        symbol: Symbol::new(data[8] as char, data[7] as char),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-3
    }

    #[test]
    fn test_uncompressed_position() {
        let obs = parse_line("KF7ABC-9>APRS,TCPIP*,qAC,T2SEATTLE:!4903.50N/07201.75W>Test 001");

        assert!(obs.frame_valid);
        assert_eq!(obs.source, "KF7ABC-9");
        let pos = obs.position.expect("position");
        assert!(close(pos.latitude, 49.058_333));
        assert!(close(pos.longitude, -72.029_166));
        assert_eq!(pos.symbol, Symbol::new('/', '>'));
    }

    #[test]
    fn test_position_with_timestamp() {
        let obs = parse_line("N0CALL>APRS:@092345z4903.50S/07201.75E-Home");

        let pos = obs.position.expect("position");
        assert!(close(pos.latitude, -49.058_333));
        assert!(close(pos.longitude, 72.029_166));
        assert_eq!(pos.symbol, Symbol::new('/', '-'));
    }

    #[test]
    fn test_ambiguous_position() {
        let obs = parse_line("N0CALL>APRS:=4903.  N/07201.  W-");

        let pos = obs.position.expect("position");
        assert!(close(pos.latitude, 49.05));
        assert!(close(pos.longitude, -72.016_666));
    }

    #[test]
    fn test_compressed_position() {
        let obs = parse_line("N0CALL>APRS:=/5L!!<*e7>7P[");

        let pos = obs.position.expect("position");
        assert!(close(pos.latitude, 49.5));
        assert!(close(pos.longitude, -72.75));
        assert_eq!(pos.symbol, Symbol::new('/', '>'));
    }

    #[test]
    fn test_mic_e_position() {
        let obs = parse_line("N0CALL>S32UVT,WIDE1-1:`(_fn\"Oj/]comment");

        let pos = obs.position.expect("position");
        assert!(close(pos.latitude, 33.427_333));
        assert!(close(pos.longitude, -112.129));
        assert_eq!(pos.symbol, Symbol::new('/', 'j'));
    }

    #[test]
    fn test_non_position_traffic() {
        let obs = parse_line("N0CALL>APRS::KF7ABC   :hello{01");

        assert!(obs.frame_valid);
        assert_eq!(obs.source, "N0CALL");
        assert!(obs.position.is_none());
    }

    #[test]
    fn test_malformed_lines_are_invalid() {
        for line in ["", "garbage", "N0CALL:APRS>body", "N0CALL>APRS:"] {
            let obs = parse_line(line);
            assert!(!obs.frame_valid, "{line:?} should be invalid");
            assert!(obs.position.is_none());
        }
    }

    #[test]
    fn test_empty_source_is_still_a_frame() {
        let obs = parse_line(">APRS:!4903.50N/07201.75W>");
        assert!(obs.frame_valid);
        assert!(obs.source.is_empty());
    }

    #[test]
    fn test_out_of_range_coordinates_rejected() {
        assert!(parse_line("N0CALL>APRS:!9903.50N/07201.75W>").position.is_none());
        assert!(parse_line("N0CALL>APRS:!4963.50N/07201.75W>").position.is_none());
        assert!(parse_line("N0CALL>APRS:!4903.50X/07201.75W>").position.is_none());
    }

    #[test]
    fn test_truncated_position_rejected() {
        assert!(parse_line("N0CALL>APRS:!4903.50N/072").position.is_none());
        assert!(parse_line("N0CALL>APRS:@0923").position.is_none());
        assert!(parse_line("N0CALL>S32U6T:`(_f").position.is_none());
    }
}
