//! Speech in and out
//!
//! The platform engines live behind two traits. The CLI plugs in a
//! line-reading recognizer and a console speaker.

use std::{
    io::{self, BufRead, Write},
    thread,
};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::Result;

/// Increments at most this many characters long are spoken whole
const SHORT_INCREMENT_CHARS: usize = 5;

const PHRASE_DELIMITERS: &[char] = &['。', '！', '？', '.', '!', '?', '\n'];

/// Speaks replies, either whole or as they stream in
pub trait SpeechSynthesizer: Send + Sync {
    /// Speak a complete text, interrupting anything in progress
    fn speak(&self, text: &str);

    /// Queue the next streamed piece of a reply
    fn speak_addition(&self, increment: &str);

    /// Stop speaking and drop anything queued
    fn stop(&self);
}

/// Output of a speech recognizer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transcript {
    /// Partial hypothesis, may still change
    Interim(String),
    /// Final text for one utterance
    Final(String),
}

impl Transcript {
    pub fn text(&self) -> &str {
        match self {
            Self::Interim(text) | Self::Final(text) => text,
        }
    }

    pub fn into_final(self) -> Option<String> {
        match self {
            Self::Final(text) => Some(text),
            Self::Interim(_) => None,
        }
    }
}

/// Callback receiving transcripts in order
pub type TranscriptCallback = Box<dyn FnMut(Transcript) + Send>;

/// Turns the child's speech into text
#[async_trait]
pub trait SpeechRecognizer: Send + Sync {
    /// Listen until the input ends or [`SpeechRecognizer::stop`] is called
    ///
    /// A stop issued before listening begins ends the next listen at once.
    async fn start(&self, on_transcript: TranscriptCallback) -> Result<()>;

    fn stop(&self);
}

/// Splits streamed text into speakable phrases
#[derive(Debug, Clone, Copy, Default)]
pub struct SentenceSplitter;

impl SentenceSplitter {
    /// Split an increment after each sentence delimiter
    ///
    /// Short increments pass through whole. The trailing piece without a
    /// delimiter is kept as its own phrase.
    pub fn split(&self, text: &str) -> Vec<String> {
        if text.is_empty() {
            return Vec::new();
        }
        if text.chars().count() <= SHORT_INCREMENT_CHARS {
            return vec![text.to_string()];
        }

        let mut phrases = Vec::new();
        let mut current = String::new();
        for ch in text.chars() {
            current.push(ch);
            if PHRASE_DELIMITERS.contains(&ch) {
                phrases.push(std::mem::take(&mut current));
            }
        }
        if !current.is_empty() {
            phrases.push(current);
        }
        phrases
    }
}

/// Rewrite punctuation so a speech engine pauses instead of reading it out
pub fn normalize_for_speech(text: &str) -> String {
    let text = text.replace("......", "。");
    let mut out = String::with_capacity(text.len());
    let mut prev_dash = false;

    for ch in text.chars() {
        let is_dash = ch == '—';
        match ch {
            '！' | '!' | '？' | '?' | '；' | ';' | '…' => out.push('。'),
            '「' | '」' | '『' | '』' | '（' | '）' | '(' | ')' | '《' | '》' | '〈' | '〉' | '"'
            | '\'' => {}
            '—' if prev_dash => {}
            '，' | '、' | ',' | '—' => out.push_str(", "),
            '：' | ':' => out.push_str(": "),
            _ => out.push(ch),
        }
        prev_dash = is_dash;
    }

    while out.contains("  ") {
        out = out.replace("  ", " ");
    }
    out
}

/// Synthesizer that "speaks" by writing phrases to a writer
pub struct ConsoleSpeaker<W: Write + Send> {
    out: Mutex<W>,
    splitter: SentenceSplitter,
    normalize: bool,
}

impl<W: Write + Send> ConsoleSpeaker<W> {
    pub fn new(out: W) -> Self {
        Self {
            out: Mutex::new(out),
            splitter: SentenceSplitter,
            normalize: false,
        }
    }

    /// Write the text a speech engine would receive instead of the raw reply
    #[must_use]
    pub fn with_normalization(mut self, normalize: bool) -> Self {
        self.normalize = normalize;
        self
    }

    pub fn into_inner(self) -> W {
        self.out.into_inner()
    }

    fn render(&self, phrase: &str) -> String {
        if self.normalize {
            normalize_for_speech(phrase)
        } else {
            phrase.to_string()
        }
    }

    fn write(&self, text: &str) {
        let mut out = self.out.lock();
        if let Err(e) = out.write_all(text.as_bytes()).and_then(|()| out.flush()) {
            warn!(error = %e, "console speaker write failed");
        }
    }
}

impl<W: Write + Send> SpeechSynthesizer for ConsoleSpeaker<W> {
    fn speak(&self, text: &str) {
        let mut line = self.render(text);
        line.push('\n');
        self.write(&line);
    }

    fn speak_addition(&self, increment: &str) {
        for phrase in self.splitter.split(increment) {
            debug!(phrase = %phrase, "speaking phrase");
            let rendered = self.render(&phrase);
            self.write(&rendered);
        }
    }

    fn stop(&self) {
        self.write("\n");
    }
}

/// Recognizer that treats each non-blank input line as a final transcript
///
/// Lines are read on a dedicated thread and handed over a channel, so a
/// blocking source such as stdin never keeps `stop` or runtime shutdown
/// waiting on a pending read.
pub struct LineRecognizer {
    lines: tokio::sync::Mutex<mpsc::UnboundedReceiver<io::Result<String>>>,
    stop: Mutex<CancellationToken>,
}

impl LineRecognizer {
    /// Start reading `reader` in the background
    ///
    /// # Errors
    ///
    /// Returns an error if the reader thread cannot be spawned
    pub fn new<R: BufRead + Send + 'static>(reader: R) -> Result<Self> {
        let (tx, rx) = mpsc::unbounded_channel();
        thread::Builder::new()
            .name("line-recognizer".into())
            .spawn(move || {
                for line in reader.lines() {
                    let failed = line.is_err();
                    if tx.send(line).is_err() || failed {
                        break;
                    }
                }
            })?;

        Ok(Self {
            lines: tokio::sync::Mutex::new(rx),
            stop: Mutex::new(CancellationToken::new()),
        })
    }
}

#[async_trait]
impl SpeechRecognizer for LineRecognizer {
    async fn start(&self, mut on_transcript: TranscriptCallback) -> Result<()> {
        let token = self.stop.lock().clone();

        let mut lines = self.lines.lock().await;
        loop {
            let line = tokio::select! {
                biased;
                () = token.cancelled() => break,
                line = lines.recv() => line,
            };
            let Some(line) = line else {
                debug!("input closed");
                break;
            };
            let line = line?;
            let text = line.trim();
            if !text.is_empty() {
                on_transcript(Transcript::Final(text.to_string()));
            }
        }

        let mut stop = self.stop.lock();
        if stop.is_cancelled() {
            *stop = CancellationToken::new();
        }
        Ok(())
    }

    fn stop(&self) {
        self.stop.lock().cancel();
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::{mpsc as std_mpsc, Arc},
        time::{Duration, Instant},
    };

    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_split_on_delimiters() {
        let phrases = SentenceSplitter.split("今天天气很好。我们去公园吧！好不好");
        assert_eq!(phrases, vec!["今天天气很好。", "我们去公园吧！", "好不好"]);
    }

    #[test]
    fn test_short_increment_is_whole() {
        assert_eq!(SentenceSplitter.split("好。呀"), vec!["好。呀"]);
        assert!(SentenceSplitter.split("").is_empty());
    }

    #[test]
    fn test_normalize_for_speech() {
        assert_eq!(normalize_for_speech("你好！真的吗？"), "你好。真的吗。");
        assert_eq!(normalize_for_speech("《小王子》（童话）"), "小王子童话");
        assert_eq!(normalize_for_speech("苹果，香蕉、梨"), "苹果, 香蕉, 梨");
        assert_eq!(normalize_for_speech("注意：小心——路滑"), "注意: 小心, 路滑");
        assert_eq!(normalize_for_speech("a,  b"), "a, b");
        assert_eq!(normalize_for_speech("嗯......好"), "嗯。好");
    }

    #[test]
    fn test_console_speaker_writes_phrases_in_order() {
        let speaker = ConsoleSpeaker::new(Vec::new());
        speaker.speak_addition("从前有座山。");
        speaker.speak_addition("山里有座庙！");
        speaker.stop();
        let out = String::from_utf8(speaker.into_inner()).unwrap();
        assert_eq!(out, "从前有座山。山里有座庙！\n");
    }

    #[test]
    fn test_console_speaker_normalizes() {
        let speaker = ConsoleSpeaker::new(Vec::new()).with_normalization(true);
        speaker.speak("太棒了！");
        let out = String::from_utf8(speaker.into_inner()).unwrap();
        assert_eq!(out, "太棒了。\n");
    }

    /// Reader whose first read blocks until the paired sender is dropped
    struct Stalled(std_mpsc::Receiver<()>);

    impl io::Read for Stalled {
        fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
            let _ = self.0.recv();
            Ok(0)
        }
    }

    #[tokio::test]
    async fn test_line_recognizer_emits_finals() {
        let recognizer = LineRecognizer::new("你好\n\n   \n 唱首歌 \n".as_bytes()).unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();

        recognizer
            .start(Box::new(move |t| sink.lock().push(t)))
            .await
            .unwrap();

        assert_eq!(
            *seen.lock(),
            vec![
                Transcript::Final("你好".into()),
                Transcript::Final("唱首歌".into()),
            ]
        );
        assert_eq!(seen.lock()[1].text(), "唱首歌");
    }

    #[test]
    fn test_stopped_recognizer_does_not_hold_runtime() {
        let (_held_open, input) = std_mpsc::channel::<()>();
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let started = Instant::now();

        runtime.block_on(async {
            let recognizer =
                Arc::new(LineRecognizer::new(io::BufReader::new(Stalled(input))).unwrap());
            let listening = {
                let recognizer = recognizer.clone();
                tokio::spawn(async move { recognizer.start(Box::new(|_| {})).await })
            };
            recognizer.stop();

            tokio::time::timeout(Duration::from_secs(2), listening)
                .await
                .expect("stop should end listening")
                .unwrap()
                .unwrap();
        });
        drop(runtime);

        assert!(started.elapsed() < Duration::from_secs(3));
    }
}
