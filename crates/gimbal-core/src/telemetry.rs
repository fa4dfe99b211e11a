//! Telemetry sample type.
//!
//! The controller answers the telemetry read command with a fixed-width
//! frame of seven semicolon-delimited numbers:
//!
//! ```text
//! <mode>;<pos_tr>;<pos_el>;<vel_tr>;<vel_el>;<cur_tr>;<cur_el>;;
//! ```
//!
//! A frame is accepted only as a whole. Any missing, extra, or non-numeric
//! field rejects the entire sample; partial updates never reach the UI.

use crate::error::{Error, Result};

/// One parsed snapshot of gimbal motion and state.
///
/// `tr` is the traverse (pan) axis and `el` the elevation (tilt) axis.
/// Values are raw device units; unit conversion belongs to the caller.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TelemetrySample {
    pub system_mode: f64,
    pub pos_tr: f64,
    pub pos_el: f64,
    pub vel_tr: f64,
    pub vel_el: f64,
    pub cur_tr: f64,
    pub cur_el: f64,
}

impl TelemetrySample {
    /// Number of fields in a telemetry frame.
    pub const FIELD_COUNT: usize = 7;

    /// Parse a telemetry frame.
    ///
    /// Surrounding whitespace and the trailing `;` or `;;` end marker are
    /// stripped. An empty field anywhere else is malformed.
    /// Returns [`Error::MalformedFrame`] unless exactly
    /// [`FIELD_COUNT`](Self::FIELD_COUNT) fields are present and every one
    /// is a finite number.
    ///
    /// # Examples
    ///
    /// ```
    /// use gimbal_core::TelemetrySample;
    ///
    /// let s = TelemetrySample::parse("2;1024;-512;3;-4;120;80;;").unwrap();
    /// assert_eq!(s.pos_el, -512.0);
    /// assert!(TelemetrySample::parse("2;1024;-512;3;-4;;").is_err());
    /// ```
    pub fn parse(text: &str) -> Result<Self> {
        let body = text.trim().trim_end_matches(';');
        let fields: Vec<&str> = if body.is_empty() {
            Vec::new()
        } else {
            body.split(';').map(str::trim).collect()
        };

        if fields.len() != Self::FIELD_COUNT {
            return Err(Error::MalformedFrame(format!(
                "expected {} fields, got {}",
                Self::FIELD_COUNT,
                fields.len()
            )));
        }

        let mut values = [0.0f64; Self::FIELD_COUNT];
        for (slot, field) in values.iter_mut().zip(&fields) {
            *slot = match field.parse::<f64>() {
                Ok(v) if v.is_finite() => v,
                _ => {
                    return Err(Error::MalformedFrame(format!(
                        "non-numeric field {field:?}"
                    )));
                }
            };
        }

        let [system_mode, pos_tr, pos_el, vel_tr, vel_el, cur_tr, cur_el] = values;
        Ok(TelemetrySample {
            system_mode,
            pos_tr,
            pos_el,
            vel_tr,
            vel_el,
            cur_tr,
            cur_el,
        })
    }

    /// The sample as an array in wire order.
    pub fn to_array(&self) -> [f64; Self::FIELD_COUNT] {
        [
            self.system_mode,
            self.pos_tr,
            self.pos_el,
            self.vel_tr,
            self.vel_el,
            self.cur_tr,
            self.cur_el,
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_full_frame() {
        let s = TelemetrySample::parse("1;100;-200;3.5;-4.25;60;70;;").unwrap();
        assert_eq!(
            s.to_array(),
            [1.0, 100.0, -200.0, 3.5, -4.25, 60.0, 70.0]
        );
    }

    #[test]
    fn parse_without_end_marker() {
        let s = TelemetrySample::parse("0;1;2;3;4;5;6").unwrap();
        assert_eq!(s.cur_el, 6.0);
    }

    #[test]
    fn parse_tolerates_whitespace() {
        let s = TelemetrySample::parse(" 0; 1;2 ;3;4;5;6;;\r\n").unwrap();
        assert_eq!(s.pos_tr, 1.0);
        assert_eq!(s.pos_el, 2.0);
    }

    #[test]
    fn parse_rejects_short_frame() {
        let err = TelemetrySample::parse("1;2;3;4;5;;").unwrap_err();
        assert!(matches!(err, Error::MalformedFrame(_)));
    }

    #[test]
    fn parse_rejects_long_frame() {
        assert!(TelemetrySample::parse("1;2;3;4;5;6;7;8;;").is_err());
    }

    #[test]
    fn parse_rejects_non_numeric_field() {
        assert!(TelemetrySample::parse("1;2;3;x4;5;6;7;;").is_err());
    }

    #[test]
    fn parse_rejects_non_finite_field() {
        assert!(TelemetrySample::parse("1;2;3;NaN;5;6;7;;").is_err());
        assert!(TelemetrySample::parse("1;2;3;inf;5;6;7;;").is_err());
    }

    #[test]
    fn parse_rejects_interior_empty_field() {
        // Eight slots with one blank must not shift the rest into place.
        let err = TelemetrySample::parse("1;2;;4;5;6;7;8").unwrap_err();
        assert!(matches!(err, Error::MalformedFrame(_)));
        assert!(TelemetrySample::parse("1;2;;4;5;6;7;8;").is_err());
        assert!(TelemetrySample::parse("1;2; ;4;5;6;7;;").is_err());
    }

    #[test]
    fn parse_rejects_blank_last_field() {
        assert!(TelemetrySample::parse("1;2;3;4;5;6;;").is_err());
    }

    #[test]
    fn parse_rejects_empty() {
        assert!(TelemetrySample::parse("").is_err());
    }
}
