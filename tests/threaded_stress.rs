use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    thread,
    time::Duration,
};

use ndarray::Array2;
use ndi_framekit::{
    AudioFormat, AudioFrameSync, AudioRecvFrame, Error, StateGroup, VideoFrameSync,
    VideoRecvFrame,
};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

const FRAMES: usize = 500;
const SEGMENT: usize = 37;
const WINDOW: usize = 64;

#[test]
fn stress_audio_producer_consumer() -> Result<(), Error> {
    init_tracing();
    let phases = Arc::new(StateGroup::new(["setup", "streaming", "done"])?);
    // large enough that nothing is evicted while the consumer lags
    let recv = Arc::new(AudioRecvFrame::with_format(FRAMES, AudioFormat::new(48000, 2)?)?);

    let producer = {
        let phases = Arc::clone(&phases);
        let recv = Arc::clone(&recv);
        thread::spawn(move || -> Result<(), Error> {
            assert!(phases.wait_for_state("streaming", Duration::from_secs(10)));
            for frame in 0..FRAMES {
                let start = frame * SEGMENT;
                let segment = Array2::from_shape_fn((2, SEGMENT), |(c, i)| {
                    ((start + i) * 2 + c) as f32
                });
                recv.write_data(segment.view(), frame as i64)?;
            }
            phases.advance()?;
            Ok(())
        })
    };

    phases.advance()?;
    let sync = AudioFrameSync::new(&recv);
    let mut next = 0usize;
    let total = FRAMES * SEGMENT;
    while next + WINDOW <= total {
        if !sync.wait_for_samples(WINDOW, Duration::from_secs(10)) {
            panic!("producer stalled at sample {next}");
        }
        let window = sync.get_array(WINDOW)?.expect("samples were available");
        for (i, (left, right)) in window.row(0).iter().zip(window.row(1)).enumerate() {
            assert_eq!(*left, ((next + i) * 2) as f32);
            assert_eq!(*right, ((next + i) * 2 + 1) as f32);
        }
        next += WINDOW;
    }

    producer.join().expect("producer panicked")?;
    assert!(phases.wait_for_state("done", Duration::from_secs(10)));
    assert_eq!(sync.available_samples(), total - next);
    assert_eq!(recv.evicted_segments(), 0);
    Ok(())
}

#[test]
fn stress_video_views_never_see_torn_frames() -> Result<(), Error> {
    init_tracing();
    let recv = Arc::new(VideoRecvFrame::new(3)?);
    let phases = Arc::new(StateGroup::new(["streaming", "done"])?);
    let written = Arc::new(AtomicUsize::new(0));

    let producer = {
        let recv = Arc::clone(&recv);
        let phases = Arc::clone(&phases);
        let written = Arc::clone(&written);
        thread::spawn(move || -> Result<(), Error> {
            for frame in 0..FRAMES {
                let data = vec![(frame % 251) as u8; 4096];
                recv.write_data_timeout(&data, frame as i64, Duration::from_secs(5))?;
                written.fetch_add(1, Ordering::Relaxed);
            }
            phases.advance()?;
            Ok(())
        })
    };

    let sync = VideoFrameSync::new(&recv);
    let mut last_timestamp = -1;
    let mut captured = 0;
    while phases.current() != "done" || recv.get_buffer_depth() > 0 {
        if !sync.wait_for_frame(Duration::from_millis(50)) {
            continue;
        }
        let Some(frame) = sync.capture()? else {
            continue;
        };
        let first = frame.data()[0];
        assert!(frame.data().iter().all(|b| *b == first), "torn frame");
        assert!(frame.timestamp() > last_timestamp);
        last_timestamp = frame.timestamp();
        captured += 1;
        sync.release(frame);
    }

    producer.join().expect("producer panicked")?;
    assert!(captured > 0);
    assert_eq!(written.load(Ordering::Relaxed), FRAMES);
    assert_eq!(recv.get_view_count(), 0);
    Ok(())
}
