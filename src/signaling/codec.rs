// Mailbox text format for session descriptions and ICE candidates
// One SDP block terminated by END_SDP, followed by CANDIDATE entries

const SDP_MARKER: &str = "SDP";
const SDP_END_MARKER: &str = "END_SDP";
const CANDIDATE_MARKER: &str = "CANDIDATE";

/// One side's signaling state as published in a mailbox file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignalingMessage {
    /// Session description (SDP offer or answer), opaque to the codec
    pub description: String,

    /// ICE candidates in the order they were gathered
    pub candidates: Vec<String>,
}

impl SignalingMessage {
    pub fn new(description: impl Into<String>, candidates: Vec<String>) -> Self {
        Self {
            description: description.into(),
            candidates,
        }
    }

    /// Serialize to the mailbox text format
    pub fn encode(&self) -> String {
        encode(&self.description, &self.candidates)
    }
}

/// Serialize a description and candidate list to the mailbox text format
///
/// ```text
/// SDP
/// <description, may span several lines>
/// END_SDP
/// CANDIDATE
/// <candidate>
/// ```
pub fn encode(description: &str, candidates: &[String]) -> String {
    let mut out = String::with_capacity(description.len() + 64 * (candidates.len() + 1));
    out.push_str(SDP_MARKER);
    out.push('\n');
    out.push_str(description);
    out.push('\n');
    out.push_str(SDP_END_MARKER);
    out.push('\n');
    for candidate in candidates {
        out.push_str(CANDIDATE_MARKER);
        out.push('\n');
        out.push_str(candidate);
        out.push('\n');
    }
    out
}

/// Parse mailbox text back into a message
///
/// Returns `None` for anything that is not a complete description block:
/// a first line other than `SDP`, a missing `END_SDP`, or a blank description.
/// The other process may be halfway through writing the file, so none of these
/// are errors. Candidate entries with an empty or missing value are skipped.
pub fn decode(text: &str) -> Option<SignalingMessage> {
    let body = text.strip_prefix(SDP_MARKER)?.strip_prefix('\n')?;

    let (description, rest) = split_description(body)?;
    if description.trim().is_empty() {
        return None;
    }

    let mut candidates = Vec::new();
    let mut lines = rest.lines();
    while let Some(line) = lines.next() {
        if line != CANDIDATE_MARKER {
            continue;
        }
        match lines.next() {
            Some(candidate) if !candidate.trim().is_empty() => {
                candidates.push(candidate.to_string());
            }
            _ => {}
        }
    }

    Some(SignalingMessage {
        description: description.to_string(),
        candidates,
    })
}

/// Split the text following the `SDP` line at the `END_SDP` line
///
/// The newline in front of `END_SDP` belongs to the format, not the description.
fn split_description(body: &str) -> Option<(&str, &str)> {
    // An empty description puts END_SDP directly after the blank separator line
    let mut search_from = 0;
    while let Some(offset) = body[search_from..].find(SDP_END_MARKER) {
        let start = search_from + offset;
        let end = start + SDP_END_MARKER.len();
        let at_line_start = start > 0 && body.as_bytes()[start - 1] == b'\n';
        let at_line_end = end == body.len() || body[end..].starts_with('\n');
        if at_line_start && at_line_end {
            let description = &body[..start - 1];
            let rest = body[end..].strip_prefix('\n').unwrap_or("");
            return Some((description, rest));
        }
        search_from = end;
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    const OFFER: &str = "v=0\r\no=str0m-1 1 2 IN IP4 0.0.0.0\r\ns=-\r\nt=0 0\r\n";

    #[test]
    fn test_round_trip_preserves_candidate_order() {
        let candidates = vec![
            "candidate:1 1 udp 2130706431 192.168.1.20 50000 typ host".to_string(),
            "candidate:2 1 udp 1694498815 203.0.113.7 61000 typ srflx raddr 192.168.1.20 rport 50000"
                .to_string(),
            "candidate:3 1 udp 2130706431 10.0.0.4 50001 typ host".to_string(),
        ];

        let decoded = decode(&encode(OFFER, &candidates)).unwrap();

        assert_eq!(decoded.description, OFFER);
        assert_eq!(decoded.candidates, candidates);
    }

    #[test]
    fn test_round_trip_without_trailing_newline() {
        let decoded = decode(&encode("v=0", &[])).unwrap();
        assert_eq!(decoded.description, "v=0");
        assert!(decoded.candidates.is_empty());
    }

    #[test]
    fn test_file_format_layout() {
        let text = encode("v=0", &["candidate:a".to_string()]);
        assert_eq!(text, "SDP\nv=0\nEND_SDP\nCANDIDATE\ncandidate:a\n");
    }

    #[test]
    fn test_partial_write_is_rejected() {
        assert_eq!(decode(""), None);
        assert_eq!(decode("SDP"), None);
        assert_eq!(decode("SDP\n"), None);
        assert_eq!(decode("SDP\nv=0\r\ns=-\r\n"), None);
    }

    #[test]
    fn test_missing_marker_is_rejected() {
        assert_eq!(decode("v=0\nEND_SDP\n"), None);
        assert_eq!(decode("SDPX\nv=0\nEND_SDP\n"), None);
    }

    #[test]
    fn test_empty_description_is_rejected() {
        assert_eq!(decode("SDP\n\nEND_SDP\n"), None);
        assert_eq!(decode("SDP\n  \nEND_SDP\nCANDIDATE\ncandidate:a\n"), None);
    }

    #[test]
    fn test_malformed_candidates_are_skipped() {
        let text = "SDP\nv=0\nEND_SDP\nCANDIDATE\n\nCANDIDATE\ncandidate:a\nstray line\nCANDIDATE\n";
        let decoded = decode(text).unwrap();
        assert_eq!(decoded.candidates, vec!["candidate:a".to_string()]);
    }

    #[test]
    fn test_end_marker_inside_line_is_not_a_terminator() {
        let text = "SDP\na=x-END_SDP\nv=0\nEND_SDP\n";
        let decoded = decode(text).unwrap();
        assert_eq!(decoded.description, "a=x-END_SDP\nv=0");
    }
}
