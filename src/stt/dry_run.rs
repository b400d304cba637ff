//! Typed-input stand-in for transcription, used when no API key is set.

use std::io::BufRead;
use std::sync::Mutex;

use crate::audio::Recording;
use crate::stt::engine::{SttError, Transcriber};
use crate::sync::lock;

/// Reads one line per "utterance" instead of sending audio anywhere.
///
/// End of input yields an empty transcript, which the session treats as
/// "nothing said".
pub struct DryRunTranscriber<R> {
    input: Mutex<R>,
}

impl DryRunTranscriber<std::io::BufReader<std::io::Stdin>> {
    pub fn stdin() -> Self {
        Self::new(std::io::BufReader::new(std::io::stdin()))
    }
}

impl<R: BufRead + Send> DryRunTranscriber<R> {
    pub fn new(input: R) -> Self {
        Self {
            input: Mutex::new(input),
        }
    }
}

impl<R: BufRead + Send> Transcriber for DryRunTranscriber<R> {
    fn transcribe(&self, _recording: &Recording) -> Result<String, SttError> {
        log::info!("stt: DRY RUN, type your message:");
        let mut line = String::new();
        lock(&self.input)
            .read_line(&mut line)
            .map_err(|e| SttError::Io(e.to_string()))?;
        Ok(line.trim().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn reads_one_trimmed_line_per_call() {
        let stt = DryRunTranscriber::new(Cursor::new("  hello there \nsecond\n"));
        let rec = Recording::new("unused.wav");
        assert_eq!(stt.transcribe(&rec).unwrap(), "hello there");
        assert_eq!(stt.transcribe(&rec).unwrap(), "second");
    }

    #[test]
    fn end_of_input_is_empty_transcript() {
        let stt = DryRunTranscriber::new(Cursor::new(""));
        assert_eq!(stt.transcribe(&Recording::new("unused.wav")).unwrap(), "");
    }
}
