//! Google encoded polyline codec.
//!
//! Summary activities from third party services carry their route as an encoded
//! polyline instead of a list of timestamped points. Each coordinate is stored as the
//! zig-zag encoded delta from the previous one, split into 5-bit chunks offset by 63.

use crate::WispError;

use super::Coordinate;

/// Precision used by Strava and Google Maps
pub const DEFAULT_PRECISION: u32 = 5;

const CHUNK_MASK: i64 = 0x1F;
const CONTINUATION_BIT: i64 = 0x20;
const CHAR_OFFSET: i64 = 63;
const MAX_SHIFT: u32 = 60;

/// Decode a polyline into coordinates. Truncated or malformed input is an error.
pub fn decode(encoded: &str, precision: u32) -> Result<Vec<Coordinate>, WispError> {
    let bytes = encoded.as_bytes();
    let factor = 10_f64.powi(precision as i32);
    let mut coordinates = Vec::new();
    let mut index = 0;
    let mut lat: i64 = 0;
    let mut lon: i64 = 0;

    while index < bytes.len() {
        lat += decode_value(bytes, &mut index)?;
        lon += decode_value(bytes, &mut index)?;
        coordinates.push(Coordinate::new(lat as f64 / factor, lon as f64 / factor));
    }

    Ok(coordinates)
}

fn decode_value(bytes: &[u8], index: &mut usize) -> Result<i64, WispError> {
    let mut result: i64 = 0;
    let mut shift: u32 = 0;
    loop {
        let byte = *bytes
            .get(*index)
            .ok_or_else(|| WispError::InvalidPolyline {
                reason: "truncated polyline".to_string(),
            })?;
        let chunk = byte as i64 - CHAR_OFFSET;
        if !(0..=63).contains(&chunk) {
            return Err(WispError::InvalidPolyline {
                reason: format!("unexpected character {:?} at {}", byte as char, *index),
            });
        }
        *index += 1;
        result |= (chunk & CHUNK_MASK) << shift;
        shift += 5;
        if chunk < CONTINUATION_BIT {
            break;
        }
        if shift > MAX_SHIFT {
            return Err(WispError::InvalidPolyline {
                reason: "value overflows 64 bits".to_string(),
            });
        }
    }

    Ok(if result & 1 != 0 {
        !(result >> 1)
    } else {
        result >> 1
    })
}

/// Encode coordinates into a polyline string.
pub fn encode(coordinates: &[Coordinate], precision: u32) -> String {
    let factor = 10_f64.powi(precision as i32);
    let mut output = String::new();
    let mut prev_lat: i64 = 0;
    let mut prev_lon: i64 = 0;

    for coordinate in coordinates {
        let lat = (coordinate.latitude * factor).round() as i64;
        let lon = (coordinate.longitude * factor).round() as i64;
        encode_value(lat - prev_lat, &mut output);
        encode_value(lon - prev_lon, &mut output);
        prev_lat = lat;
        prev_lon = lon;
    }

    output
}

fn encode_value(delta: i64, output: &mut String) {
    let mut value = if delta < 0 { !(delta << 1) } else { delta << 1 };
    while value >= CONTINUATION_BIT {
        output.push((((value & CHUNK_MASK) | CONTINUATION_BIT) + CHAR_OFFSET) as u8 as char);
        value >>= 5;
    }
    output.push((value + CHAR_OFFSET) as u8 as char);
}

#[cfg(test)]
mod tests {
    use super::*;

    // Reference example from the polyline algorithm documentation
    const REFERENCE: &str = "_p~iF~ps|U_ulLnnqC_mqNvxq`@";

    #[test]
    fn test_decode_reference_polyline() {
        let coords = decode(REFERENCE, DEFAULT_PRECISION).unwrap();
        assert_eq!(coords.len(), 3);
        assert_eq!(coords[0], Coordinate::new(38.5, -120.2));
        assert_eq!(coords[1], Coordinate::new(40.7, -120.95));
        assert_eq!(coords[2], Coordinate::new(43.252, -126.453));
    }

    #[test]
    fn test_encode_reference_polyline() {
        let coords = vec![
            Coordinate::new(38.5, -120.2),
            Coordinate::new(40.7, -120.95),
            Coordinate::new(43.252, -126.453),
        ];
        assert_eq!(encode(&coords, DEFAULT_PRECISION), REFERENCE);
    }

    #[test]
    fn test_decode_empty_polyline() {
        assert!(decode("", DEFAULT_PRECISION).unwrap().is_empty());
    }

    #[test]
    fn test_decode_truncated_polyline() {
        // drop the longitude of the last point
        let truncated = &REFERENCE[..REFERENCE.len() - 4];
        assert!(matches!(
            decode(truncated, DEFAULT_PRECISION),
            Err(WispError::InvalidPolyline { .. })
        ));
    }

    #[test]
    fn test_decode_rejects_invalid_characters() {
        assert!(decode("_p~iF ps|U", DEFAULT_PRECISION).is_err());
    }
}
