//! Offline render graph.
//!
//! Nodes are scheduled at absolute times on the graph timeline, then the
//! whole graph is rendered in one pass. Nothing is rescheduled once the
//! render starts; the only control during a render is cancellation.
//!
//! Rendering runs in blocks like a realtime engine, but node starts and
//! stops are sample accurate inside a block. A node that produces a
//! non-finite sample fails the whole render: partial output is never
//! returned.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use super::buffer::RenderedBuffer;
use super::envelope::KeyingEnvelope;
use super::mixer::Mixer;
use super::oscillator::Oscillator;
use super::sampler::{SampleBuffer, SamplePlayer};
use crate::error::RenderError;

/// Frames rendered per block.
pub const BLOCK_SIZE: usize = 128;

/// Index of a node in its graph.
pub type NodeId = usize;

#[derive(Debug, Clone)]
pub enum NodeKind {
    /// A decoded clip played once, or looped until its stop time.
    Clip {
        buffer: Arc<SampleBuffer>,
        playback_rate: f64,
        looping: bool,
    },
    /// A keyed sine tone.
    Tone { frequency: f64, duration: f64 },
}

#[derive(Debug, Clone)]
pub struct ScheduledNode {
    pub kind: NodeKind,
    /// Start time in seconds on the graph timeline.
    pub start: f64,
    /// Forced stop time, if any.
    pub stop: Option<f64>,
    pub gain: f64,
}

/// Shared flag that aborts a render between blocks.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone)]
pub struct RenderGraph {
    sample_rate: u32,
    /// Timeline length in seconds.
    length: f64,
    master_gain: f64,
    nodes: Vec<ScheduledNode>,
}

enum ActiveNode {
    Clip(SamplePlayer),
    Tone(Oscillator, KeyingEnvelope),
}

impl ActiveNode {
    fn next_sample(&mut self) -> f64 {
        match self {
            ActiveNode::Clip(player) => player.next_sample(),
            ActiveNode::Tone(osc, env) => osc.next_sample() * env.next_sample(),
        }
    }

    fn stop(&mut self) {
        match self {
            ActiveNode::Clip(player) => player.stop(),
            ActiveNode::Tone(_, env) => env.stop(),
        }
    }

    fn is_finished(&self) -> bool {
        match self {
            ActiveNode::Clip(player) => player.is_finished(),
            ActiveNode::Tone(_, env) => env.is_finished(),
        }
    }
}

struct Voice {
    node: NodeId,
    start_frame: usize,
    stop_frame: usize,
    source: ActiveNode,
}

impl RenderGraph {
    pub fn new(sample_rate: u32, length: f64) -> Self {
        RenderGraph {
            sample_rate,
            length,
            master_gain: 1.0,
            nodes: Vec::new(),
        }
    }

    pub fn set_master_gain(&mut self, gain: f64) {
        self.master_gain = gain;
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn length(&self) -> f64 {
        self.length
    }

    pub fn frames(&self) -> usize {
        (self.length * self.sample_rate as f64).ceil().max(0.0) as usize
    }

    pub fn nodes(&self) -> &[ScheduledNode] {
        &self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    fn push(&mut self, node: ScheduledNode) -> NodeId {
        self.nodes.push(node);
        self.nodes.len() - 1
    }

    /// Play `buffer` once starting at `at` seconds.
    pub fn clip(&mut self, buffer: Arc<SampleBuffer>, at: f64, playback_rate: f64, gain: f64) -> NodeId {
        self.push(ScheduledNode {
            kind: NodeKind::Clip {
                buffer,
                playback_rate,
                looping: false,
            },
            start: at,
            stop: None,
            gain,
        })
    }

    /// Loop `buffer` from `at` until `until` seconds.
    pub fn looped(&mut self, buffer: Arc<SampleBuffer>, at: f64, until: f64, gain: f64) -> NodeId {
        self.push(ScheduledNode {
            kind: NodeKind::Clip {
                buffer,
                playback_rate: 1.0,
                looping: true,
            },
            start: at,
            stop: Some(until),
            gain,
        })
    }

    /// Sine tone of `duration` seconds starting at `at`.
    pub fn tone(&mut self, frequency: f64, at: f64, duration: f64, gain: f64) -> NodeId {
        self.push(ScheduledNode {
            kind: NodeKind::Tone {
                frequency,
                duration,
            },
            start: at,
            stop: None,
            gain,
        })
    }

    fn to_frame(&self, seconds: f64) -> usize {
        (seconds * self.sample_rate as f64).round().max(0.0) as usize
    }

    fn validate(&self) -> Result<(), RenderError> {
        if self.sample_rate == 0 || self.frames() == 0 {
            return Err(RenderError::Empty);
        }
        for (node, n) in self.nodes.iter().enumerate() {
            let invalid = |reason: &str| RenderError::InvalidNode {
                node,
                reason: reason.to_string(),
            };
            if !n.start.is_finite() || n.start < 0.0 {
                return Err(invalid("start time must be a non-negative number"));
            }
            match &n.kind {
                NodeKind::Clip {
                    buffer,
                    playback_rate,
                    ..
                } => {
                    if buffer.is_empty() {
                        return Err(invalid("buffer has no samples"));
                    }
                    if buffer.sample_rate == 0 {
                        return Err(invalid("buffer has a zero sample rate"));
                    }
                    if !playback_rate.is_finite() || *playback_rate <= 0.0 {
                        return Err(invalid("playback rate must be positive"));
                    }
                }
                NodeKind::Tone {
                    frequency,
                    duration,
                } => {
                    if !frequency.is_finite() || *frequency <= 0.0 {
                        return Err(invalid("tone frequency must be positive"));
                    }
                    if !duration.is_finite() || *duration < 0.0 {
                        return Err(invalid("tone duration must be non-negative"));
                    }
                }
            }
        }
        Ok(())
    }

    fn voice(&self, node: NodeId, n: &ScheduledNode) -> Voice {
        let sr = self.sample_rate as f64;
        let start_frame = self.to_frame(n.start);
        let stop_frame = n.stop.map_or(usize::MAX, |t| self.to_frame(t));
        let source = match &n.kind {
            NodeKind::Clip {
                buffer,
                playback_rate,
                looping,
            } => {
                let player = SamplePlayer::new(buffer.clone(), *playback_rate, n.gain, sr);
                ActiveNode::Clip(if *looping { player.looping() } else { player })
            }
            NodeKind::Tone {
                frequency,
                duration,
            } => ActiveNode::Tone(
                Oscillator::new(*frequency, sr),
                KeyingEnvelope::new(*duration, n.gain, sr),
            ),
        };
        Voice {
            node,
            start_frame,
            stop_frame,
            source,
        }
    }

    /// Render the whole timeline.
    pub fn render(&self) -> Result<RenderedBuffer, RenderError> {
        self.render_with(&CancelToken::new(), |_| {})
    }

    /// Render, checking `cancel` between blocks and reporting progress in
    /// [0, 1] after each block.
    pub fn render_with(
        &self,
        cancel: &CancelToken,
        mut progress: impl FnMut(f64),
    ) -> Result<RenderedBuffer, RenderError> {
        self.validate()?;

        let total_frames = self.frames();
        let mut pending: Vec<Voice> = self
            .nodes
            .iter()
            .enumerate()
            .map(|(id, n)| self.voice(id, n))
            .filter(|v| v.start_frame < total_frames)
            .collect();
        // Latest start first so the next voice to activate is popped off the end.
        pending.sort_by(|a, b| b.start_frame.cmp(&a.start_frame).then(b.node.cmp(&a.node)));

        let mut mixer = Mixer::new(self.master_gain);
        let mut active: Vec<Voice> = Vec::new();
        let mut output = Vec::with_capacity(total_frames);

        let mut block_start = 0;
        while block_start < total_frames {
            if cancel.is_cancelled() {
                return Err(RenderError::Cancelled);
            }
            let block_end = (block_start + BLOCK_SIZE).min(total_frames);
            let this_block = block_end - block_start;

            while pending.last().is_some_and(|v| v.start_frame < block_end) {
                if let Some(voice) = pending.pop() {
                    active.push(voice);
                }
            }

            mixer.clear(this_block);
            for voice in active.iter_mut() {
                for i in 0..this_block {
                    let frame = block_start + i;
                    if frame < voice.start_frame {
                        continue;
                    }
                    if frame >= voice.stop_frame {
                        voice.source.stop();
                    }
                    if voice.source.is_finished() {
                        break;
                    }
                    let sample = voice.source.next_sample();
                    if !sample.is_finite() {
                        return Err(RenderError::NodeFailed {
                            node: voice.node,
                            frame,
                        });
                    }
                    mixer.add(i, sample);
                }
            }

            output.extend(mixer.output().map(|s| s as f32));
            active.retain(|v| !v.source.is_finished());

            block_start = block_end;
            progress(block_start as f64 / total_frames as f64);
        }

        Ok(RenderedBuffer::mono(output, self.sample_rate))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ones(len: usize, sample_rate: u32) -> Arc<SampleBuffer> {
        Arc::new(SampleBuffer::new(vec![1.0; len], sample_rate))
    }

    #[test]
    fn clips_start_on_their_exact_frame() {
        let mut graph = RenderGraph::new(1000, 1.0);
        graph.clip(ones(10, 1000), 0.2, 1.0, 0.5);
        let out = graph.render().unwrap();
        let ch = out.channel(0).unwrap();
        assert_eq!(out.frames(), 1000);
        assert_eq!(ch[199], 0.0);
        assert_eq!(ch[200], 0.5);
        assert_eq!(ch[209], 0.5);
        assert_eq!(ch[210], 0.0);
    }

    #[test]
    fn overlapping_nodes_are_summed_with_master_gain() {
        let mut graph = RenderGraph::new(1000, 0.1);
        graph.clip(ones(50, 1000), 0.0, 1.0, 0.5);
        graph.clip(ones(50, 1000), 0.0, 1.0, 0.25);
        graph.set_master_gain(0.5);
        let out = graph.render().unwrap();
        assert!((out.channel(0).unwrap()[10] - 0.375).abs() < 1e-6);
    }

    #[test]
    fn playback_rate_shortens_clip() {
        let mut graph = RenderGraph::new(1000, 1.0);
        graph.clip(ones(200, 1000), 0.0, 2.0, 1.0);
        let out = graph.render().unwrap();
        let sounding = out.channel(0).unwrap().iter().filter(|&&s| s != 0.0).count();
        assert_eq!(sounding, 100);
    }

    #[test]
    fn looped_node_runs_until_stop() {
        let mut graph = RenderGraph::new(1000, 1.0);
        graph.looped(ones(10, 1000), 0.0, 0.5, 1.0);
        let out = graph.render().unwrap();
        let ch = out.channel(0).unwrap();
        assert_eq!(ch[499], 1.0);
        assert_eq!(ch[500], 0.0);
        assert_eq!(ch[999], 0.0);
    }

    #[test]
    fn tone_is_keyed_for_its_duration() {
        let mut graph = RenderGraph::new(8000, 0.5);
        graph.tone(800.0, 0.1, 0.06, 0.7);
        let out = graph.render().unwrap();
        let ch = out.channel(0).unwrap();
        assert!(ch[..800].iter().all(|&s| s == 0.0), "silent before start");
        assert!(ch[1280..].iter().all(|&s| s == 0.0), "silent after tone");
        let peak = ch[800..1280].iter().fold(0.0_f32, |p, s| p.max(s.abs()));
        assert!(peak > 0.6 && peak <= 0.7, "tone peak {peak}");
    }

    #[test]
    fn non_finite_node_output_fails_render() {
        let mut graph = RenderGraph::new(1000, 0.1);
        graph.clip(ones(10, 1000), 0.0, 1.0, 1.0);
        graph.clip(Arc::new(SampleBuffer::new(vec![0.0, 0.0, f64::NAN], 1000)), 0.05, 1.0, 1.0);
        assert_eq!(graph.render(), Err(RenderError::NodeFailed { node: 1, frame: 51 }));
    }

    #[test]
    fn invalid_nodes_are_rejected_before_rendering() {
        let mut graph = RenderGraph::new(1000, 0.1);
        graph.clip(Arc::new(SampleBuffer::new(vec![], 1000)), 0.0, 1.0, 1.0);
        assert!(matches!(graph.render(), Err(RenderError::InvalidNode { node: 0, .. })));

        let mut graph = RenderGraph::new(1000, 0.1);
        graph.clip(ones(10, 1000), 0.0, 0.0, 1.0);
        assert!(matches!(graph.render(), Err(RenderError::InvalidNode { .. })));
    }

    #[test]
    fn zero_length_graph_is_empty() {
        assert_eq!(RenderGraph::new(44100, 0.0).render(), Err(RenderError::Empty));
    }

    #[test]
    fn cancelled_render_returns_no_output() {
        let mut graph = RenderGraph::new(1000, 1.0);
        graph.clip(ones(100, 1000), 0.0, 1.0, 1.0);
        let cancel = CancelToken::new();
        cancel.cancel();
        assert_eq!(graph.render_with(&cancel, |_| {}), Err(RenderError::Cancelled));
    }

    #[test]
    fn progress_reaches_one() {
        let graph = RenderGraph::new(1000, 1.0);
        let mut last = 0.0;
        let mut calls = 0;
        graph
            .render_with(&CancelToken::new(), |p| {
                assert!(p >= last, "progress must not go backwards");
                last = p;
                calls += 1;
            })
            .unwrap();
        assert_eq!(last, 1.0);
        assert_eq!(calls, 1000_usize.div_ceil(BLOCK_SIZE));
    }
}
