//! Runs a `QuizMachine` on tokio.
//!
//! The driver interprets the machine's effects: timers become tasks that
//! deliver their token back, source calls run as spawned tasks whose results
//! come back as events, and everything the host must act on (persist the
//! profile, post the finished session, show an alert, play audio) is
//! returned as `Outcome`s.

use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use crate::audio::{decode_pcm16, DecodedAudio};
use crate::profile::Profile;
use crate::protocol::FinishPayload;
use crate::session::{Effect, Event, QuizMachine, TransitionError};
use crate::source::{load_deck, score_pronunciation, QuestionSource};
use crate::timer::{TimerToken, Timers};

#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// Persist this snapshot (whole object).
    ProfileChanged(Profile),
    /// Post this summary to the attempt log.
    SessionFinished(FinishPayload),
    Alert(String),
    OpenUrl(String),
    PlayAudio { audio_base64: String, audio: DecodedAudio },
}

/// Results of spawned source calls.
enum Completion {
    Event(Event),
    Speech(Option<String>),
}

pub struct SessionDriver<S> {
    machine: QuizMachine,
    source: Option<Arc<S>>,
    timers: Timers,
    timer_tx: UnboundedSender<TimerToken>,
    timer_rx: UnboundedReceiver<TimerToken>,
    done_tx: UnboundedSender<Completion>,
    done_rx: UnboundedReceiver<Completion>,
    calls: Vec<JoinHandle<()>>,
    rng: StdRng,
}

impl<S> SessionDriver<S>
where
    S: QuestionSource + Send + Sync + 'static,
{
    pub fn new(machine: QuizMachine, source: Option<Arc<S>>) -> Self {
        Self::with_rng(machine, source, StdRng::from_entropy())
    }

    /// Deterministic opponent rolls for a given seed.
    pub fn seeded(machine: QuizMachine, source: Option<Arc<S>>, seed: u64) -> Self {
        Self::with_rng(machine, source, StdRng::seed_from_u64(seed))
    }

    fn with_rng(machine: QuizMachine, source: Option<Arc<S>>, rng: StdRng) -> Self {
        let (timer_tx, timer_rx) = unbounded_channel();
        let (done_tx, done_rx) = unbounded_channel();
        Self {
            machine,
            source,
            timers: Timers::default(),
            timer_tx,
            timer_rx,
            done_tx,
            done_rx,
            calls: Vec::new(),
            rng,
        }
    }

    pub fn machine(&self) -> &QuizMachine {
        &self.machine
    }

    pub fn running_timers(&self) -> usize {
        self.timers.running()
    }

    /// Mount the machine (arms the intro delay).
    pub fn start(&mut self) -> Vec<Outcome> {
        let effects = self.machine.start();
        self.run(effects)
    }

    pub fn dispatch(&mut self, event: Event) -> Result<Vec<Outcome>, TransitionError> {
        let effects = self.machine.handle(event)?;
        Ok(self.run(effects))
    }

    /// Wait for the next timer tick or source result and feed it to the
    /// machine. Cancel-safe: nothing is consumed until a message arrives.
    pub async fn step(&mut self) -> Result<Vec<Outcome>, TransitionError> {
        let event = tokio::select! {
            Some(token) = self.timer_rx.recv() => {
                let roll: f64 = self.rng.gen();
                Event::Timer { token, roll }
            }
            Some(done) = self.done_rx.recv() => match done {
                Completion::Event(event) => event,
                Completion::Speech(audio) => return self.on_speech(audio),
            },
        };
        self.dispatch(event)
    }

    fn on_speech(&mut self, audio: Option<String>) -> Result<Vec<Outcome>, TransitionError> {
        let decoded = audio.and_then(|b64| match decode_pcm16(&b64) {
            Ok(audio) if !audio.samples.is_empty() => Some((b64, audio)),
            Ok(_) => None,
            Err(e) => {
                warn!(target: "session", error = %e, "Speech audio could not be decoded");
                None
            }
        });
        let mut outcomes = Vec::new();
        let ok = decoded.is_some();
        if let Some((audio_base64, audio)) = decoded {
            debug!(target: "session", secs = audio.duration_secs(), "Speech ready");
            outcomes.push(Outcome::PlayAudio { audio_base64, audio });
        }
        outcomes.extend(self.dispatch(Event::SpeechFinished { ok })?);
        Ok(outcomes)
    }

    fn spawn_call<F>(&mut self, fut: F)
    where
        F: std::future::Future<Output = Completion> + Send + 'static,
    {
        let tx = self.done_tx.clone();
        self.calls.retain(|h| !h.is_finished());
        self.calls.push(tokio::spawn(async move {
            let _ = tx.send(fut.await);
        }));
    }

    fn run(&mut self, effects: Vec<Effect>) -> Vec<Outcome> {
        let mut outcomes = Vec::new();
        for effect in effects {
            match effect {
                Effect::Schedule { token, schedule } => self.timers.start(token, schedule, self.timer_tx.clone()),
                Effect::Cancel(token) => self.timers.cancel(token),
                Effect::Generate { request, req } => {
                    let source = self.source.clone();
                    self.spawn_call(async move {
                        let deck = load_deck(source.as_deref(), &req).await;
                        Completion::Event(Event::QuestionsLoaded { request, deck })
                    });
                }
                Effect::EvaluatePronunciation { audio_base64, word, language } => {
                    let source = self.source.clone();
                    self.spawn_call(async move {
                        let fb = score_pronunciation(source.as_deref(), &audio_base64, &word, language).await;
                        Completion::Event(Event::PronunciationScored(fb))
                    });
                }
                Effect::FetchSpeech { text, language } => {
                    let source = self.source.clone();
                    self.spawn_call(async move {
                        let audio = match source.as_deref() {
                            Some(s) => match s.synthesize_speech(&text, language).await {
                                Ok(b64) => Some(b64),
                                Err(e) => {
                                    error!(target: "quizz", error = %e, "Speech synthesis failed");
                                    None
                                }
                            },
                            None => None,
                        };
                        Completion::Speech(audio)
                    });
                }
                Effect::SaveProfile(profile) => outcomes.push(Outcome::ProfileChanged(profile)),
                Effect::Finish(payload) => outcomes.push(Outcome::SessionFinished(payload)),
                Effect::Alert(message) => outcomes.push(Outcome::Alert(message)),
                Effect::OpenUrl(url) => outcomes.push(Outcome::OpenUrl(url)),
            }
        }
        outcomes
    }
}

impl<S> Drop for SessionDriver<S> {
    fn drop(&mut self) {
        for call in self.calls.drain(..) {
            call.abort();
        }
    }
}
