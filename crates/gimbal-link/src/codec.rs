//! Wire codec for the gimbal text protocol.
//!
//! Outgoing commands are ASCII lines terminated by a single carriage
//! return. Incoming text is accumulated chunk by chunk until a
//! [`FrameTerminator`] says the frame is complete.
//!
//! Decoding never fails. The protocol is single-byte ASCII, but USB CDC
//! reads can split anywhere, so [`FrameDecoder`] holds back an incomplete
//! UTF-8 sequence at a chunk boundary and resumes it on the next chunk.
//! Bytes that can never form valid text decode as U+FFFD.

use gimbal_core::error::{Error, Result};

/// Byte appended to every outgoing command.
pub const COMMAND_TERMINATOR: u8 = b'\r';

/// End-of-frame marker used by current controller firmware.
pub const FRAME_END_MARKER: &str = ";;";

/// Encode a command for transmission.
///
/// Appends [`COMMAND_TERMINATOR`]. Commands with an embedded CR or NUL are
/// rejected, since either would split or truncate the line on the device.
///
/// # Examples
///
/// ```
/// use gimbal_link::codec::encode_command;
///
/// assert_eq!(encode_command("R1[1]=1").unwrap(), b"R1[1]=1\r");
/// assert!(encode_command("R1[1]=1\rR1[2]=0").is_err());
/// ```
pub fn encode_command(command: &str) -> Result<Vec<u8>> {
    if command.contains('\r') {
        return Err(Error::InvalidCommand(format!(
            "embedded carriage return in {command:?}"
        )));
    }
    if command.contains('\0') {
        return Err(Error::InvalidCommand(format!("embedded NUL in {command:?}")));
    }

    let mut bytes = Vec::with_capacity(command.len() + 1);
    bytes.extend_from_slice(command.as_bytes());
    bytes.push(COMMAND_TERMINATOR);
    Ok(bytes)
}

/// Decode one self-contained buffer of received bytes.
///
/// Invalid or truncated sequences become U+FFFD. For a byte stream that
/// arrives in chunks, use [`FrameDecoder`] instead.
pub fn decode(bytes: &[u8]) -> String {
    let mut decoder = FrameDecoder::new();
    let mut text = decoder.push(bytes);
    text.push_str(&decoder.finish());
    text
}

/// Stateful, permissive byte-to-text decoder for a chunked stream.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    /// Leading bytes of a multi-byte sequence cut off at the end of the
    /// previous chunk. At most three bytes.
    pending: Vec<u8>,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode the next chunk, returning all text that is complete so far.
    pub fn push(&mut self, chunk: &[u8]) -> String {
        let mut input = std::mem::take(&mut self.pending);
        input.extend_from_slice(chunk);

        let mut out = String::with_capacity(input.len());
        let mut rest = input.as_slice();

        loop {
            match std::str::from_utf8(rest) {
                Ok(valid) => {
                    out.push_str(valid);
                    break;
                }
                Err(e) => {
                    let (valid, after) = rest.split_at(e.valid_up_to());
                    // valid_up_to() guarantees this prefix is UTF-8.
                    out.push_str(std::str::from_utf8(valid).unwrap_or_default());
                    match e.error_len() {
                        Some(len) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            rest = &after[len..];
                        }
                        None => {
                            // Truncated sequence at the end of the chunk.
                            self.pending.extend_from_slice(after);
                            break;
                        }
                    }
                }
            }
        }

        out
    }

    /// Flush any held-back partial sequence as U+FFFD.
    pub fn finish(&mut self) -> String {
        if self.pending.is_empty() {
            String::new()
        } else {
            self.pending.clear();
            char::REPLACEMENT_CHARACTER.to_string()
        }
    }

    /// Drop any held-back bytes.
    pub fn reset(&mut self) {
        self.pending.clear();
    }

    /// Whether a partial sequence is being held back.
    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }
}

/// Rule deciding when accumulated response text forms a complete frame.
///
/// Controller firmware revisions disagree on framing, so this is deployment
/// configuration rather than a protocol constant.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum FrameTerminator {
    /// The frame ends at the first `;;`.
    #[default]
    DoubleSemicolon,
    /// The frame ends once the accumulated text ends with any of these
    /// characters (e.g. `;`, `\n`, `\r`).
    TrailingAny(Vec<char>),
}

impl FrameTerminator {
    /// The `;` / `\n` / `\r` rule used by older firmware.
    pub fn line_or_semicolon() -> Self {
        FrameTerminator::TrailingAny(vec![';', '\n', '\r'])
    }

    /// Split a complete frame off the front of `text`.
    ///
    /// Returns `(frame, rest)` where `frame` includes the terminator and
    /// `rest` is any text received after it, or `None` if the frame is not
    /// complete yet.
    pub fn split_frame<'a>(&self, text: &'a str) -> Option<(&'a str, &'a str)> {
        match self {
            FrameTerminator::DoubleSemicolon => text
                .find(FRAME_END_MARKER)
                .map(|pos| text.split_at(pos + FRAME_END_MARKER.len())),
            FrameTerminator::TrailingAny(chars) => {
                if text.ends_with(chars.as_slice()) {
                    Some((text, ""))
                } else {
                    None
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // -----------------------------------------------------------------------
    // encode_command
    // -----------------------------------------------------------------------

    #[test]
    fn encode_appends_single_cr() {
        assert_eq!(encode_command("R1[10]=0").unwrap(), b"R1[10]=0\r");
    }

    #[test]
    fn encode_multiple_assignments() {
        assert_eq!(
            encode_command("R1[1]=1;R1[2]=0").unwrap(),
            b"R1[1]=1;R1[2]=0\r"
        );
    }

    #[test]
    fn encode_empty_command_is_bare_cr() {
        assert_eq!(encode_command("").unwrap(), b"\r");
    }

    #[test]
    fn encode_rejects_embedded_cr() {
        let err = encode_command("R1[1]=1\r").unwrap_err();
        assert!(matches!(err, Error::InvalidCommand(_)));
    }

    #[test]
    fn encode_rejects_embedded_nul() {
        assert!(matches!(
            encode_command("R1[1]\0=1"),
            Err(Error::InvalidCommand(_))
        ));
    }

    #[test]
    fn decode_inverts_encode() {
        for cmd in ["R1[1]=1", "MODE=2;R1[31]=-1226", "", "speed=0.5"] {
            let bytes = encode_command(cmd).unwrap();
            let text = decode(&bytes);
            assert_eq!(text.strip_suffix('\r'), Some(cmd));
        }
    }

    // -----------------------------------------------------------------------
    // FrameDecoder
    // -----------------------------------------------------------------------

    #[test]
    fn decoder_passes_ascii_through() {
        let mut d = FrameDecoder::new();
        assert_eq!(d.push(b"R1[10];0;"), "R1[10];0;");
        assert!(!d.has_pending());
    }

    #[test]
    fn decoder_resumes_split_sequence() {
        // "°" is C2 B0.
        let mut d = FrameDecoder::new();
        assert_eq!(d.push(b"angle=12\xC2"), "angle=12");
        assert!(d.has_pending());
        assert_eq!(d.push(b"\xB0;;"), "°;;");
        assert!(!d.has_pending());
    }

    #[test]
    fn decoder_replaces_invalid_bytes() {
        let mut d = FrameDecoder::new();
        assert_eq!(d.push(b"a\xFFb"), "a\u{FFFD}b");
    }

    #[test]
    fn decoder_finish_flushes_partial() {
        let mut d = FrameDecoder::new();
        assert_eq!(d.push(b"x\xE2\x82"), "x");
        assert_eq!(d.finish(), "\u{FFFD}");
        assert!(!d.has_pending());
    }

    #[test]
    fn decoder_reset_drops_partial() {
        let mut d = FrameDecoder::new();
        d.push(b"\xE2");
        d.reset();
        assert_eq!(d.push(b"ok"), "ok");
    }

    #[test]
    fn decode_truncated_tail() {
        assert_eq!(decode(b"ok\xC2"), "ok\u{FFFD}");
    }

    // -----------------------------------------------------------------------
    // FrameTerminator
    // -----------------------------------------------------------------------

    #[test]
    fn double_semicolon_incomplete() {
        assert_eq!(FrameTerminator::DoubleSemicolon.split_frame("1;2;3;"), None);
    }

    #[test]
    fn double_semicolon_complete_with_backlog() {
        let t = FrameTerminator::DoubleSemicolon;
        assert_eq!(t.split_frame("1;2;;3;4"), Some(("1;2;;", "3;4")));
    }

    #[test]
    fn trailing_any_matches_last_char() {
        let t = FrameTerminator::line_or_semicolon();
        assert_eq!(t.split_frame("R1[2];5;"), Some(("R1[2];5;", "")));
        assert_eq!(t.split_frame("ok\n"), Some(("ok\n", "")));
        assert_eq!(t.split_frame("R1[2];5"), None);
    }

    #[test]
    fn default_terminator_is_double_semicolon() {
        assert_eq!(FrameTerminator::default(), FrameTerminator::DoubleSemicolon);
    }
}
