// ABOUTME: Incremental scanner that watches channel output for a password prompt.
// ABOUTME: Tracks negotiation state and keeps a transcript for error reporting.

/// Where the elevation negotiation currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanState {
    /// Still watching output for the prompt marker.
    AwaitingPrompt,
    /// The marker arrived; the secret may now be sent.
    PromptSatisfied,
    /// Secret sent; remaining output belongs to the command.
    Draining,
    /// Negotiation finished.
    Done,
}

/// Scans a byte stream for a prompt marker.
///
/// The marker can be split across arbitrarily many chunks; the scanner
/// matches on the accumulated transcript, not on individual chunks. The
/// prompt only counts when the transcript ends with the marker, so output
/// that merely mentions it midstream does not satisfy the wait.
pub struct PromptScanner {
    marker: Vec<u8>,
    transcript: Vec<u8>,
    state: ScanState,
}

impl PromptScanner {
    pub fn new(marker: impl Into<Vec<u8>>) -> Self {
        Self {
            marker: marker.into(),
            transcript: Vec::new(),
            state: ScanState::AwaitingPrompt,
        }
    }

    pub fn state(&self) -> ScanState {
        self.state
    }

    /// Feed a chunk of channel output and return the resulting state.
    pub fn feed(&mut self, chunk: &[u8]) -> ScanState {
        self.transcript.extend_from_slice(chunk);
        if self.state == ScanState::AwaitingPrompt && self.transcript.ends_with(&self.marker) {
            self.state = ScanState::PromptSatisfied;
        }
        self.state
    }

    /// Record that the secret has been written to the channel.
    pub fn secret_injected(&mut self) {
        debug_assert_eq!(self.state, ScanState::PromptSatisfied);
        self.state = ScanState::Draining;
    }

    pub fn complete(&mut self) {
        self.state = ScanState::Done;
    }

    pub fn transcript(&self) -> &[u8] {
        &self.transcript
    }

    pub fn transcript_lossy(&self) -> String {
        String::from_utf8_lossy(&self.transcript).into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const MARKER: &[u8] = b"[sudo] password: ";

    #[test]
    fn whole_marker_in_one_chunk_satisfies_the_prompt() {
        let mut scanner = PromptScanner::new(MARKER);
        assert_eq!(scanner.feed(b"[sudo] password: "), ScanState::PromptSatisfied);
    }

    #[test]
    fn marker_split_byte_by_byte_still_matches() {
        let mut scanner = PromptScanner::new(MARKER);
        for byte in MARKER {
            scanner.feed(std::slice::from_ref(byte));
        }
        assert_eq!(scanner.state(), ScanState::PromptSatisfied);
    }

    #[test]
    fn marker_mentioned_midstream_does_not_satisfy() {
        let mut scanner = PromptScanner::new(MARKER);
        scanner.feed(b"echoing [sudo] password: for fun\n");
        assert_eq!(scanner.state(), ScanState::AwaitingPrompt);
    }

    #[test]
    fn transcript_accumulates_every_chunk() {
        let mut scanner = PromptScanner::new(MARKER);
        scanner.feed(b"motd\n");
        scanner.feed(b"[sudo] password: ");
        assert_eq!(scanner.transcript(), b"motd\n[sudo] password: ");
    }

    #[test]
    fn states_advance_in_order() {
        let mut scanner = PromptScanner::new(MARKER);
        assert_eq!(scanner.state(), ScanState::AwaitingPrompt);
        scanner.feed(MARKER);
        assert_eq!(scanner.state(), ScanState::PromptSatisfied);
        scanner.secret_injected();
        assert_eq!(scanner.state(), ScanState::Draining);
        scanner.complete();
        assert_eq!(scanner.state(), ScanState::Done);
    }

    proptest! {
        /// The prompt is recognized no matter how the stream is chunked.
        #[test]
        fn marker_survives_arbitrary_chunking(cuts in prop::collection::vec(any::<prop::sample::Index>(), 0..8)) {
            let payload: Vec<u8> = [b"attempt output\r\n".as_slice(), MARKER].concat();
            let mut offsets: Vec<usize> = cuts.iter().map(|i| i.index(payload.len())).collect();
            offsets.push(0);
            offsets.push(payload.len());
            offsets.sort_unstable();

            let mut scanner = PromptScanner::new(MARKER);
            for pair in offsets.windows(2) {
                scanner.feed(&payload[pair[0]..pair[1]]);
            }
            prop_assert_eq!(scanner.state(), ScanState::PromptSatisfied);
        }
    }
}
