//! Fixed-rate render thread

use crossbeam_channel::{select, tick, Receiver};
use std::sync::atomic::Ordering;
use std::time::{Duration, Instant};

use super::EngineState;
use crate::audio::SignalProcessor;
use crate::error::OutputError;
use crate::output::OutputSink;
use crate::render::Renderer;

fn frame_period(fps: u32) -> Duration {
    Duration::from_secs_f64(1.0 / f64::from(fps.max(1)))
}

fn ticker(fps: u32) -> Receiver<Instant> {
    tick(frame_period(fps))
}

/// Tick until shutdown: process audio, advance playback, render, output
///
/// Returns the sink error when output fails persistently; the engine is
/// marked stopped before returning so the process can exit.
pub(super) fn run(
    state: &EngineState,
    mut renderer: Renderer,
    mut sink: Box<dyn OutputSink>,
) -> Result<(), OutputError> {
    let mut processor = SignalProcessor::new();
    let (mut fps, mut brightness) = {
        let store = state.config.read();
        let hw = &store.config().hardware;
        (hw.fps, hw.brightness)
    };
    sink.set_brightness(brightness);
    let mut frames = ticker(fps);

    while state.running.load(Ordering::SeqCst) {
        select! {
            recv(frames) -> _ => {}
            recv(state.shutdown_rx) -> _ => break,
        }

        let now = Instant::now();
        let (audio, effects, hardware, current, generation) = {
            let store = state.config.read();
            let mut pb = state.playback.lock();
            let config = store.config();
            pb.tick(config, now);
            (
                config.audio.clone(),
                config.effects.clone(),
                config.hardware.clone(),
                pb.current().to_string(),
                pb.generation(),
            )
        };

        processor.tick(&state.slot, &state.snapshot, now, &audio);
        let snapshot = state.snapshot.read();

        renderer.sync(&current, generation);
        let frame = renderer.render(now, &snapshot, &effects, hardware.num_leds, hardware.rgbw);
        state.frames_rendered.fetch_add(1, Ordering::Relaxed);
        state.render_faults.store(renderer.faults(), Ordering::Relaxed);

        if hardware.brightness != brightness {
            brightness = hardware.brightness;
            sink.set_brightness(brightness);
        }

        if let Err(e) = sink.show(&frame) {
            tracing::error!("{} output failed: {}, stopping", sink.name(), e);
            state.running.store(false, Ordering::SeqCst);
            state.shutdown_tx.lock().take();
            let _ = sink.clear();
            return Err(e);
        }

        if hardware.fps != fps {
            tracing::info!("Frame rate changed {} -> {}", fps, hardware.fps);
            fps = hardware.fps;
            frames = ticker(fps);
        }
    }

    if let Err(e) = sink.clear() {
        tracing::warn!("Failed to blank {} output: {}", sink.name(), e);
    }
    tracing::info!("Render loop stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_period() {
        assert_eq!(frame_period(50), Duration::from_millis(20));
        assert_eq!(frame_period(0), Duration::from_secs(1));
    }
}
