//! Transmission scheduler.
//!
//! An [`AudioContext`] is the shared output: sample rate, master volume and
//! the background noise loop. A [`Transmitter`] owns the single transmission
//! slot on that context and drives it through
//! `Idle → Scheduled → Playing → Completed | Stopped`.
//!
//! Starting builds the whole sequence and render graph synchronously, so
//! bad input and a busy slot are reported before anything runs. The render
//! itself happens on the blocking pool; the returned [`Transmission`]
//! resolves when it finishes. A wall-clock timeout slightly longer than the
//! transmission guards against a render that never completes.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::dsp::buffer::RenderedBuffer;
use crate::dsp::graph::CancelToken;
use crate::dsp::noise::noise_loop;
use crate::dsp::renderer::GraphBuilder;
use crate::dsp::sampler::SampleBuffer;
use crate::encoder::EncodedMessage;
use crate::error::{RenderError, ResourceError, StateError, StationError, ValidationError};
use crate::morse::{build_cw_sequence, build_cw_text_sequence};
use crate::sequence::{TransmissionSequence, VoiceScript, require_sound};
use crate::settings::{TransmissionSettings, UNIT_RANGE, check_range};
use crate::voice_pack::{SoundKey, VoicePack};

#[cfg(feature = "loader")]
use crate::loader::VoicePackLoader;

/// Extra wall-clock time a render gets beyond its own length.
pub const SAFETY_MARGIN: f64 = 0.5;

/// Shared output context. Create once per session and hand it to every
/// [`Transmitter`].
#[derive(Debug)]
pub struct AudioContext {
    sample_rate: u32,
    master_volume: AtomicU64,
    noise: Arc<SampleBuffer>,
}

impl AudioContext {
    pub fn new(sample_rate: u32) -> Self {
        AudioContext {
            sample_rate,
            master_volume: AtomicU64::new(1.0_f64.to_bits()),
            noise: Arc::new(noise_loop(sample_rate)),
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn master_volume(&self) -> f64 {
        f64::from_bits(self.master_volume.load(Ordering::Relaxed))
    }

    /// Applies to transmissions started after the call.
    pub fn set_master_volume(&self, volume: f64) -> Result<(), ValidationError> {
        check_range("masterVolume", volume, UNIT_RANGE)?;
        self.master_volume.store(volume.to_bits(), Ordering::Relaxed);
        Ok(())
    }

    pub fn noise(&self) -> Arc<SampleBuffer> {
        self.noise.clone()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransmissionState {
    #[default]
    Idle,
    Scheduled,
    Playing,
    Completed,
    Stopped,
}

impl TransmissionState {
    pub fn is_active(self) -> bool {
        matches!(self, TransmissionState::Scheduled | TransmissionState::Playing)
    }
}

/// What to transmit.
#[derive(Debug, Clone)]
pub enum TransmissionRequest {
    /// Full voice transmission of an encoded message.
    Voice { message: EncodedMessage, pack: Arc<VoicePack> },
    /// Raw voice input, see [`VoiceScript::from_text`].
    VoiceText { text: String, pack: Arc<VoicePack> },
    /// Full CW transmission of an encoded message.
    Morse { message: EncodedMessage },
    /// Raw Morse input.
    MorseText { text: String },
    /// One clip, for the manual dialer.
    Single { sound: SoundKey, pack: Arc<VoicePack> },
}

#[cfg(feature = "loader")]
impl TransmissionRequest {
    /// Voice transmission using the pack named by `settings.voice_pack`,
    /// loading it first if needed.
    pub async fn voice(
        message: EncodedMessage,
        settings: &TransmissionSettings,
        loader: &VoicePackLoader,
    ) -> Result<Self, StationError> {
        let pack = load_pack(loader, &settings.voice_pack).await?;
        Ok(TransmissionRequest::Voice { message, pack })
    }

    pub async fn voice_text(
        text: impl Into<String>,
        settings: &TransmissionSettings,
        loader: &VoicePackLoader,
    ) -> Result<Self, StationError> {
        let pack = load_pack(loader, &settings.voice_pack).await?;
        Ok(TransmissionRequest::VoiceText { text: text.into(), pack })
    }

    pub async fn single(
        sound: SoundKey,
        settings: &TransmissionSettings,
        loader: &VoicePackLoader,
    ) -> Result<Self, StationError> {
        let pack = load_pack(loader, &settings.voice_pack).await?;
        Ok(TransmissionRequest::Single { sound, pack })
    }
}

#[cfg(feature = "loader")]
async fn load_pack(loader: &VoicePackLoader, id: &str) -> Result<Arc<VoicePack>, StationError> {
    loader.load(id).await.map_err(|err| {
        tracing::warn!(pack = id, error = %err, "failed to load voice pack");
        ResourceError::PackUnavailable {
            pack: id.to_string(),
            reason: err.to_string(),
        }
        .into()
    })
}

impl TransmissionRequest {
    fn pack(&self) -> Option<&VoicePack> {
        match self {
            TransmissionRequest::Voice { pack, .. }
            | TransmissionRequest::VoiceText { pack, .. }
            | TransmissionRequest::Single { pack, .. } => Some(pack.as_ref()),
            TransmissionRequest::Morse { .. } | TransmissionRequest::MorseText { .. } => None,
        }
    }

    fn sequence(&self, settings: &TransmissionSettings) -> Result<TransmissionSequence, StationError> {
        let rate = settings.playback_rate();
        let mut rng = rand::thread_rng();
        match self {
            TransmissionRequest::Voice { message, pack } => {
                VoiceScript::for_message(message, settings, &mut rng)?.schedule(pack, rate)
            }
            TransmissionRequest::VoiceText { text, pack } => {
                let script = VoiceScript::from_text(text, settings);
                require_sound(&script)?;
                script.schedule(pack, rate)
            }
            TransmissionRequest::Morse { message } => build_cw_sequence(message, settings, &mut rng),
            TransmissionRequest::MorseText { text } => build_cw_text_sequence(text, settings),
            TransmissionRequest::Single { sound, pack } => VoiceScript::single(*sound).schedule(pack, rate),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransmissionStatus {
    pub state: TransmissionState,
    /// Computed length of the current transmission in seconds.
    pub duration: f64,
    /// Render progress in [0, 1].
    pub progress: f64,
}

#[derive(Debug, Default)]
struct Slot {
    state: TransmissionState,
    generation: u64,
    duration: f64,
    cancel: Option<CancelToken>,
}

#[derive(Debug)]
struct Shared {
    slot: Mutex<Slot>,
    progress: AtomicU64,
    state_tx: watch::Sender<TransmissionState>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Slot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_state(&self, slot: &mut Slot, state: TransmissionState) {
        slot.state = state;
        self.state_tx.send_replace(state);
    }

    fn set_progress(&self, progress: f64) {
        self.progress.store(progress.to_bits(), Ordering::Relaxed);
    }

    /// Move a scheduled transmission to `Playing`. Fails if it was stopped
    /// or replaced in the meantime.
    fn begin(&self, generation: u64) -> Result<(), StationError> {
        let mut slot = self.lock();
        Self::check_current(&slot, generation)?;
        self.set_state(&mut slot, TransmissionState::Playing);
        Ok(())
    }

    fn finish(
        &self,
        generation: u64,
        outcome: Result<RenderedBuffer, StationError>,
    ) -> Result<RenderedBuffer, StationError> {
        let mut slot = self.lock();
        Self::check_current(&slot, generation)?;
        slot.cancel = None;
        match &outcome {
            Ok(_) | Err(StationError::Resource(ResourceError::RenderTimedOut { .. })) => {
                self.set_state(&mut slot, TransmissionState::Completed);
            }
            Err(err) => {
                tracing::warn!(generation, error = %err, "transmission render failed");
                self.set_state(&mut slot, TransmissionState::Stopped);
            }
        }
        outcome
    }

    fn check_current(slot: &Slot, generation: u64) -> Result<(), StationError> {
        if slot.generation != generation {
            return Err(StateError::Stale(generation).into());
        }
        if slot.state == TransmissionState::Stopped {
            return Err(StateError::Stopped.into());
        }
        Ok(())
    }
}

/// Owns the single transmission slot of one [`AudioContext`].
#[derive(Debug)]
pub struct Transmitter {
    context: Arc<AudioContext>,
    shared: Arc<Shared>,
}

impl Transmitter {
    pub fn new(context: Arc<AudioContext>) -> Self {
        let (state_tx, _) = watch::channel(TransmissionState::Idle);
        Transmitter {
            context,
            shared: Arc::new(Shared {
                slot: Mutex::new(Slot::default()),
                progress: AtomicU64::new(0),
                state_tx,
            }),
        }
    }

    pub fn context(&self) -> &Arc<AudioContext> {
        &self.context
    }

    pub fn state(&self) -> TransmissionState {
        self.shared.lock().state
    }

    pub fn status(&self) -> TransmissionStatus {
        let slot = self.shared.lock();
        TransmissionStatus {
            state: slot.state,
            duration: slot.duration,
            progress: f64::from_bits(self.shared.progress.load(Ordering::Relaxed)),
        }
    }

    /// Receiver that sees every state change.
    pub fn subscribe(&self) -> watch::Receiver<TransmissionState> {
        self.shared.state_tx.subscribe()
    }

    /// Build and schedule a transmission.
    ///
    /// Fails immediately with [`StateError::Busy`] while another
    /// transmission is scheduled or playing, and with
    /// [`ResourceError::NoRuntime`] outside a Tokio runtime. Voice requests
    /// must carry the pack named by `settings.voice_pack`.
    pub fn start(
        &self,
        request: TransmissionRequest,
        settings: &TransmissionSettings,
    ) -> Result<Transmission, StationError> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| ResourceError::NoRuntime)?;
        let mut slot = self.shared.lock();
        if slot.state.is_active() {
            return Err(StateError::Busy.into());
        }
        settings.validate()?;
        if let Some(pack) = request.pack() {
            if pack.id != settings.voice_pack {
                return Err(ValidationError::PackMismatch {
                    setting: settings.voice_pack.clone(),
                    pack: pack.id.clone(),
                }
                .into());
            }
        }

        let sequence = request.sequence(settings)?;
        let mut builder = GraphBuilder::new(settings, self.context.sample_rate())
            .noise(self.context.noise())
            .master_gain(self.context.master_volume());
        if let Some(pack) = request.pack() {
            builder = builder.pack(pack);
        }
        let graph = builder.build(&sequence)?;

        slot.generation += 1;
        slot.duration = sequence.total_duration();
        let cancel = CancelToken::new();
        slot.cancel = Some(cancel.clone());
        self.shared.set_progress(0.0);
        self.shared.set_state(&mut slot, TransmissionState::Scheduled);
        let generation = slot.generation;
        drop(slot);

        tracing::info!(
            generation,
            events = sequence.len(),
            duration = sequence.total_duration(),
            "transmission scheduled"
        );

        let shared = self.shared.clone();
        let limit = graph.length() + SAFETY_MARGIN;
        let handle = runtime.spawn(async move {
            shared.begin(generation)?;

            let progress = shared.clone();
            let render_cancel = cancel.clone();
            let render = tokio::task::spawn_blocking(move || {
                graph.render_with(&render_cancel, |p| progress.set_progress(p))
            });

            let timed = tokio::time::timeout(Duration::from_secs_f64(limit), render).await;
            let outcome: Result<RenderedBuffer, StationError> = match timed {
                Ok(Ok(result)) => result.map_err(|e| ResourceError::from(e).into()),
                Ok(Err(join)) if join.is_panic() => std::panic::resume_unwind(join.into_panic()),
                Ok(Err(_)) => Err(ResourceError::from(RenderError::Cancelled).into()),
                Err(_) => {
                    cancel.cancel();
                    tracing::warn!(generation, seconds = limit, "render timed out");
                    Err(ResourceError::RenderTimedOut { seconds: limit }.into())
                }
            };
            shared.finish(generation, outcome)
        });

        Ok(Transmission {
            generation,
            duration: sequence.total_duration(),
            handle,
        })
    }

    /// Silence the current transmission. Synchronous; a no-op unless a
    /// transmission is scheduled or playing.
    pub fn stop(&self) {
        let mut slot = self.shared.lock();
        if !slot.state.is_active() {
            return;
        }
        if let Some(cancel) = slot.cancel.take() {
            cancel.cancel();
        }
        self.shared.set_state(&mut slot, TransmissionState::Stopped);
        tracing::info!(generation = slot.generation, "transmission stopped");
    }
}

/// Handle to a started transmission.
#[derive(Debug)]
pub struct Transmission {
    generation: u64,
    duration: f64,
    handle: JoinHandle<Result<RenderedBuffer, StationError>>,
}

impl Transmission {
    pub fn id(&self) -> u64 {
        self.generation
    }

    /// Computed length in seconds, lead-in excluded.
    pub fn duration(&self) -> f64 {
        self.duration
    }

    /// Wait for the render. Resolves to the rendered audio, or to
    /// [`StateError::Stopped`] if the transmission was stopped first.
    pub async fn finished(self) -> Result<RenderedBuffer, StationError> {
        match self.handle.await {
            Ok(result) => result,
            Err(join) if join.is_panic() => std::panic::resume_unwind(join.into_panic()),
            Err(_) => Err(ResourceError::from(RenderError::Cancelled).into()),
        }
    }
}
