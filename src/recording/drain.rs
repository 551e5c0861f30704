//! Encoder drain loop
//!
//! Moves frames from the data provider into encoder input slots and
//! compressed units from encoder output slots into the muxer. Output must
//! arrive as: one format change, then data units, then end of stream.

use std::time::{Duration, Instant};

use super::codec::{BufferInfo, EncodedUnit, EncoderStatus, TrackFormat};
use super::session::EncodeSession;
use crate::errors::RecordingError;
use crate::pool::DataProvider;

/// Bounded wait for encoder input and output slots
pub const DEQUEUE_TIMEOUT: Duration = Duration::from_millis(10);

/// Longest the end-of-stream pass waits without any encoder progress
pub const EOS_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Run drain passes until `running` turns false, then hand the session back.
///
/// A fault ends the loop: the session is released right away and `halt`
/// runs so the owner stops reporting the stream as recording. The error is
/// returned with the (released) session.
pub(crate) fn run_drain_loop<F, H>(
    mut session: EncodeSession,
    provider: Option<&dyn DataProvider>,
    running: F,
    halt: H,
) -> (EncodeSession, Result<(), RecordingError>)
where
    F: Fn() -> bool,
    H: FnOnce(),
{
    log::debug!("Recording thread starts");
    let has_input = provider.is_some() || session.config.uses_producer_surface;
    while running() {
        if !has_input {
            std::thread::sleep(DEQUEUE_TIMEOUT);
            continue;
        }
        if let Err(e) = drain_pass(&mut session, provider, false, &running) {
            log::error!("Recording thread stopped on error: {}", e);
            if let Err(release_err) = session.release() {
                log::warn!("Error releasing encode session after fault: {}", release_err);
            }
            halt();
            return (session, Err(e));
        }
    }
    log::debug!("Recording thread completes");
    (session, Ok(()))
}

/// Feed and drain until the encoder has nothing more to give.
///
/// Without `end_of_stream` the pass ends at the first empty poll (or when
/// `running` turns false). With it, the pass submits end of stream once the
/// provider is empty and keeps polling until the encoder echoes it.
pub(crate) fn drain_pass(
    session: &mut EncodeSession,
    provider: Option<&dyn DataProvider>,
    end_of_stream: bool,
    running: &dyn Fn() -> bool,
) -> Result<(), RecordingError> {
    if session.output_eos_seen {
        return Ok(());
    }

    let surface_mode = session.config.uses_producer_surface;
    if !surface_mode && provider.is_none() {
        log::trace!("No data provider, nothing to drain");
        return Ok(());
    }
    if surface_mode && end_of_stream && !session.eos_queued {
        session.encoder.signal_end_of_input()?;
        session.eos_queued = true;
    }

    let mut last_progress = Instant::now();
    loop {
        if !end_of_stream && !running() {
            return Ok(());
        }

        if !surface_mode && !session.eos_queued {
            if let Some(provider) = provider {
                feed_input(session, provider, end_of_stream)?;
            }
        }

        match session.encoder.dequeue_output(DEQUEUE_TIMEOUT)? {
            EncoderStatus::TryAgainLater => {
                if !end_of_stream {
                    return Ok(());
                }
                if last_progress.elapsed() >= EOS_DRAIN_TIMEOUT {
                    return Err(RecordingError::protocol(
                        "encoder never signalled end of stream",
                    ));
                }
                log::trace!("No output available, spinning to await end of stream");
            }
            EncoderStatus::OutputFormatChanged(format) => {
                start_muxer(session, &format)?;
                last_progress = Instant::now();
            }
            EncoderStatus::Output(unit) => {
                last_progress = Instant::now();
                if forward_output(session, unit, end_of_stream)? {
                    return Ok(());
                }
            }
        }
    }
}

fn feed_input(
    session: &mut EncodeSession,
    provider: &dyn DataProvider,
    end_of_stream: bool,
) -> Result<(), RecordingError> {
    match provider.get_frame() {
        Some(frame) => {
            let queued = match session.encoder.dequeue_input(DEQUEUE_TIMEOUT) {
                Ok(Some(slot)) => {
                    let pts = frame.pts_us.unwrap_or(session.last_input_pts_us);
                    session
                        .encoder
                        .queue_input(slot, &frame.data, BufferInfo::sample(frame.len(), pts))
                        .map(|_| Some(pts))
                }
                Ok(None) => Ok(None),
                Err(e) => Err(e),
            };
            // The encoder has copied the bytes (or never got them)
            provider.recycle(frame);

            match queued? {
                Some(pts) => {
                    session.last_input_pts_us = pts;
                    session.stats.frames_queued += 1;
                }
                None => {
                    session.stats.input_timeouts += 1;
                    log::debug!("No encoder input slot within {:?}, frame skipped", DEQUEUE_TIMEOUT);
                }
            }
        }
        None if end_of_stream => {
            if let Some(slot) = session.encoder.dequeue_input(DEQUEUE_TIMEOUT)? {
                let pts = session.last_input_pts_us + session.config.frame_interval_us();
                session
                    .encoder
                    .queue_input(slot, &[], BufferInfo::end_of_stream(pts))?;
                session.eos_queued = true;
                log::debug!("Queued end of stream at {} us", pts);
            }
        }
        None => {}
    }
    Ok(())
}

fn start_muxer(session: &mut EncodeSession, format: &TrackFormat) -> Result<(), RecordingError> {
    if session.muxer_started {
        return Err(RecordingError::protocol("output format changed twice"));
    }
    let track = session.muxer.add_track(format)?;
    session.muxer.start()?;
    session.track = Some(track);
    session.muxer_started = true;
    log::info!(
        "Muxer started: {:?} {}x{} track {:?}",
        format.codec,
        format.width,
        format.height,
        track
    );
    Ok(())
}

/// Write one unit to the muxer and release its slot. Returns true at end of stream.
fn forward_output(
    session: &mut EncodeSession,
    unit: EncodedUnit,
    end_of_stream: bool,
) -> Result<bool, RecordingError> {
    let mut info = unit.info;
    if info.codec_config {
        // Already delivered with the format change
        log::debug!("Ignoring codec config unit of {} bytes", info.size);
        info.size = 0;
    }

    let written = if info.size != 0 {
        write_sample(session, &unit, &info)
    } else {
        Ok(())
    };
    let released = session.encoder.release_output(unit.slot);
    written?;
    released?;

    if info.end_of_stream {
        if end_of_stream {
            log::debug!("End of stream reached");
        } else {
            log::warn!("Reached end of stream unexpectedly");
        }
        session.output_eos_seen = true;
        return Ok(true);
    }
    Ok(false)
}

fn write_sample(
    session: &mut EncodeSession,
    unit: &EncodedUnit,
    info: &BufferInfo,
) -> Result<(), RecordingError> {
    let track = match (session.muxer_started, session.track) {
        (true, Some(track)) => track,
        _ => return Err(RecordingError::protocol("muxer hasn't started")),
    };
    let data = unit.data.get(..info.size).ok_or_else(|| {
        RecordingError::protocol(format!(
            "output unit claims {} bytes but holds {}",
            info.size,
            unit.data.len()
        ))
    })?;

    session.muxer.write_sample(track, data, info)?;

    let stats = &mut session.stats;
    stats.samples_written += 1;
    stats.bytes_written += data.len() as u64;
    stats.first_sample_us.get_or_insert(info.presentation_time_us);
    stats.last_sample_us = Some(info.presentation_time_us);
    log::trace!("Sample written: {} bytes at {} us", data.len(), info.presentation_time_us);
    Ok(())
}
