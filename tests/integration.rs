//! End-to-end tests: raw frames in, store queries and noise reports out.

use coulter_daq::acquisition::{DetectorTrigger, Pipeline, RunControl, RunRate, RunState};
use coulter_daq::analysis::{voltage, NoiseAnalyzer};
use coulter_daq::decode::{
    FrameDecoder, RecordMeta, SampleRecord, CHANNELS, HEADER_LEN, SLOTS, SUBSAMPLES,
};
use coulter_daq::source::{
    FrameSource, MockDetector, RawFrame, RecordingSource, RecordingWriter, SimulationConfig,
};
use coulter_daq::store::SampleStore;
use std::io::Cursor;
use std::sync::atomic::AtomicBool;
use std::sync::mpsc;

fn frame_with(records: &[SampleRecord]) -> RawFrame {
    let mut payload = vec![0u8; HEADER_LEN];
    for record in records {
        payload.extend_from_slice(&record.encode());
    }
    RawFrame::data(payload)
}

fn record(channel: u8, last: bool, slot: u16, samples: [u16; 8]) -> SampleRecord {
    SampleRecord {
        meta: RecordMeta {
            channel,
            last,
            slot,
        },
        samples,
    }
}

#[test]
fn test_channel_series_reports_placed_values() {
    let store = SampleStore::unbounded();
    let mut pipeline = Pipeline::new(store.clone());
    let raw = frame_with(&[record(0, false, 0, [100, 200, 300, 400, 0, 0, 0, 0])]);

    for _ in 0..12 {
        pipeline.accept(&raw);
    }
    assert_eq!(store.len(), 12);

    let series = store.channel_series(0).unwrap();
    assert_eq!(series.len(), 12 * SLOTS * SUBSAMPLES);

    let mut hits = 0;
    for point in series {
        let expected = match (point.slot, point.subsample) {
            (0, 0) => 100,
            (0, 1) => 200,
            (0, 2) => 300,
            (0, 3) => 400,
            _ => 0,
        };
        assert_eq!(point.value, expected, "{:?}", point);
        if expected != 0 {
            hits += 1;
        }
    }
    assert_eq!(hits, 12 * 4);

    for channel in 1..CHANNELS {
        assert!(store.channel_series(channel).unwrap().all(|p| p.value == 0));
    }
}

#[test]
fn test_decoding_is_idempotent() {
    let store = SampleStore::unbounded();
    let mut pipeline = Pipeline::new(store.clone());
    let raw = MockDetector::default().data_frame();

    pipeline.accept(&raw);
    pipeline.accept(&raw);

    assert_eq!(store.len(), 2);
    assert_eq!(*store.get(0).unwrap(), *store.get(1).unwrap());
}

#[test]
fn test_diagnostic_frame_does_not_consume_index() {
    let store = SampleStore::unbounded();
    let (tx, rx) = mpsc::channel();
    let mut pipeline = Pipeline::with_decoder(FrameDecoder::with_events(tx), store.clone());

    pipeline.accept(&frame_with(&[]));
    assert_eq!(pipeline.accept(&RawFrame::text(3, "temperature ok\n")), None);
    assert_eq!(store.len(), 1);

    let index = pipeline.accept(&frame_with(&[]));
    assert_eq!(index, Some(1));
    assert_eq!(pipeline.stats().diagnostic_frames, 1);
    assert!(rx.try_iter().next().is_some());
}

#[test]
fn test_transport_error_frame_dropped() {
    let store = SampleStore::unbounded();
    let mut pipeline = Pipeline::new(store.clone());

    let errored = MockDetector::default().data_frame().with_error(2);
    assert_eq!(pipeline.accept(&errored), None);

    assert!(store.is_empty());
    assert_eq!(pipeline.stats().transport_errors, 1);
}

#[test]
fn test_recording_replay_matches_live_decode() {
    let config = SimulationConfig {
        diagnostic_every: 4,
        ..Default::default()
    };

    let mut writer = RecordingWriter::new(Vec::new());
    let mut detector = MockDetector::new(config.clone()).with_limit(8);
    while let Some(frame) = detector.next_frame().unwrap() {
        writer.write_frame(&frame).unwrap();
    }
    let bytes = writer.finish().unwrap();

    let live = SampleStore::unbounded();
    Pipeline::new(live.clone())
        .run(
            &mut MockDetector::new(config).with_limit(8),
            &AtomicBool::new(false),
        )
        .unwrap();

    let replayed = SampleStore::unbounded();
    let mut pipeline = Pipeline::new(replayed.clone());
    let mut source = RecordingSource::new(Cursor::new(bytes));
    let summary = pipeline.run(&mut source, &AtomicBool::new(false)).unwrap();

    assert!(!summary.cancelled);
    assert_eq!(summary.frames_seen, 10);
    assert_eq!(pipeline.stats().diagnostic_frames, 2);
    assert_eq!(replayed.len(), 8);
    for index in 0..8 {
        assert_eq!(*live.get(index).unwrap(), *replayed.get(index).unwrap());
    }
}

#[test]
fn test_simulated_run_then_noise_analysis() {
    let config = SimulationConfig {
        noise: 0,
        ..Default::default()
    };
    let store = SampleStore::unbounded();
    let (tx, rx) = mpsc::channel();

    let mut control = RunControl::new(store.clone(), RunRate::Auto).with_limit(15);
    control
        .start(DetectorTrigger::new(MockDetector::new(config), tx))
        .unwrap();

    let mut source = rx;
    Pipeline::new(store.clone())
        .run(&mut source, &AtomicBool::new(false))
        .unwrap();

    assert_eq!(control.wait().unwrap(), 15);
    assert_eq!(control.state(), RunState::Idle);
    assert_eq!(store.len(), 15);

    let report = NoiseAnalyzer::default().analyze(&store, 10, None).unwrap();
    assert_eq!(report.analyzed_frames, 5);
    assert!(report.pixels.iter().all(|p| p.even == 0.0 && p.odd == 0.0));
    assert_eq!(voltage(store.get(0).unwrap().get(2, 0, 0).unwrap()), 0.5);
}
