use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeZone, Utc};
use parking_lot::Mutex;
use uuid::Uuid;

use hirexpert_proctor::config::{AppConfig, AudioConstraints, VideoConstraints};
use hirexpert_proctor::error::{AppError, AppResult};
use hirexpert_proctor::face::{
    BoundingBox, Detection, DetectorFactory, FaceDetector, FrameSnapshot,
};
use hirexpert_proctor::gateway::{
    AnswerUpload, Gateway, SetupSubmission, SetupValidation, TokenStatus,
};
use hirexpert_proctor::guard::RedirectReason;
use hirexpert_proctor::interview::{Candidate, Interview, Question};
use hirexpert_proctor::media::{
    CaptureStream, MediaBackend, MediaError, Recorder, RecorderState, RecordingArtifact, VideoSink,
};
use hirexpert_proctor::progress::{progress_key, MemoryStateStore, ProgressRecord, StateStore};
use hirexpert_proctor::session::{
    FullscreenSurface, InterviewSession, SessionLoad, SessionPlatform, Stage,
};

fn at(ms: i64) -> chrono::DateTime<Utc> {
    Utc.timestamp_millis_opt(ms).single().expect("timestamp")
}

struct FakeStream {
    id: Uuid,
    ended: Arc<AtomicBool>,
}

impl CaptureStream for FakeStream {
    fn id(&self) -> Uuid {
        self.id
    }

    fn has_video(&self) -> bool {
        true
    }

    fn has_audio(&self) -> bool {
        true
    }

    fn tracks_ended(&self) -> bool {
        self.ended.load(Ordering::SeqCst)
    }

    fn stop_all(&mut self) {
        self.ended.store(true, Ordering::SeqCst);
    }
}

#[derive(Default)]
struct FakeMedia {
    acquisitions: Mutex<Vec<Arc<AtomicBool>>>,
}

impl FakeMedia {
    fn acquired_streams(&self) -> usize {
        self.acquisitions.lock().len()
    }

    fn last_stream_ended(&self) -> bool {
        self.acquisitions
            .lock()
            .last()
            .map(|e| e.load(Ordering::SeqCst))
            .unwrap_or(false)
    }
}

impl MediaBackend for FakeMedia {
    fn acquire(
        &self,
        _video: &VideoConstraints,
        _audio: &AudioConstraints,
    ) -> Result<Box<dyn CaptureStream>, MediaError> {
        let ended = Arc::new(AtomicBool::new(false));
        self.acquisitions.lock().push(ended.clone());
        Ok(Box::new(FakeStream {
            id: Uuid::new_v4(),
            ended,
        }))
    }

    fn is_type_supported(&self, mime: &str) -> bool {
        mime == "video/webm;codecs=vp9,opus"
    }

    fn recorder(
        &self,
        _stream: &dyn CaptureStream,
        mime: &str,
    ) -> Result<Box<dyn Recorder>, MediaError> {
        Ok(Box::new(FakeRecorder {
            mime: mime.to_string(),
            recording: false,
        }))
    }
}

struct FakeRecorder {
    mime: String,
    recording: bool,
}

impl Recorder for FakeRecorder {
    fn start(&mut self, _timeslice: Duration) -> anyhow::Result<()> {
        self.recording = true;
        Ok(())
    }

    fn stop(&mut self) -> anyhow::Result<RecordingArtifact> {
        self.recording = false;
        Ok(RecordingArtifact {
            data: vec![0u8; 128],
            mime_type: self.mime.clone(),
        })
    }

    fn state(&self) -> RecorderState {
        if self.recording {
            RecorderState::Recording
        } else {
            RecorderState::Inactive
        }
    }
}

#[derive(Default)]
struct SinkState {
    attached: Option<Uuid>,
    playing: bool,
    play_fails: bool,
    playback_mime: Option<String>,
}

struct FakeSink(Arc<Mutex<SinkState>>);

impl VideoSink for FakeSink {
    fn attached_stream(&self) -> Option<Uuid> {
        self.0.lock().attached
    }

    fn attach(&mut self, stream: &dyn CaptureStream) {
        self.0.lock().attached = Some(stream.id());
    }

    fn detach(&mut self) {
        let mut s = self.0.lock();
        s.attached = None;
        s.playback_mime = None;
    }

    fn play(&mut self) -> anyhow::Result<()> {
        let mut s = self.0.lock();
        if s.play_fails {
            anyhow::bail!("playback blocked");
        }
        s.playing = true;
        Ok(())
    }

    fn pause(&mut self) {
        self.0.lock().playing = false;
    }

    fn is_ready(&self) -> bool {
        self.0.lock().attached.is_some()
    }

    fn arm_gesture_playback(&mut self) {}

    fn show_playback(&mut self, artifact: &RecordingArtifact) -> anyhow::Result<()> {
        self.0.lock().playback_mime = Some(artifact.mime_type.clone());
        Ok(())
    }
}

struct FakeDetector;

impl FaceDetector for FakeDetector {
    fn detect(&mut self) -> anyhow::Result<Option<FrameSnapshot>> {
        // one well-framed confident face in a 640x480 frame
        Ok(Some(FrameSnapshot {
            detections: vec![Detection {
                confidence: 0.9,
                bounding_box: BoundingBox {
                    x: 220.0,
                    y: 140.0,
                    width: 200.0,
                    height: 200.0,
                },
            }],
            frame_width: 640.0,
            frame_height: 480.0,
        }))
    }
}

struct FakeDetectorFactory;

impl DetectorFactory for FakeDetectorFactory {
    fn create(&self) -> anyhow::Result<Box<dyn FaceDetector>> {
        Ok(Box::new(FakeDetector))
    }
}

struct EmptyFrameDetector;

impl FaceDetector for EmptyFrameDetector {
    fn detect(&mut self) -> anyhow::Result<Option<FrameSnapshot>> {
        Ok(Some(FrameSnapshot {
            detections: Vec::new(),
            frame_width: 640.0,
            frame_height: 480.0,
        }))
    }
}

struct EmptyFrameDetectorFactory;

impl DetectorFactory for EmptyFrameDetectorFactory {
    fn create(&self) -> anyhow::Result<Box<dyn FaceDetector>> {
        Ok(Box::new(EmptyFrameDetector))
    }
}

struct FakeFullscreen(Arc<AtomicBool>);

impl FullscreenSurface for FakeFullscreen {
    fn is_active(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    fn request(&mut self) -> anyhow::Result<()> {
        self.0.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn exit(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

#[derive(Debug)]
struct UploadRecord {
    question_id: String,
    tab_switch_count: u32,
    total_warnings: usize,
    question_warnings: usize,
    bytes: usize,
    mime: String,
}

struct MockGateway {
    interview: Interview,
    uploads: Mutex<Vec<UploadRecord>>,
    fail_next_upload: AtomicBool,
}

impl MockGateway {
    fn new(interview: Interview) -> Self {
        Self {
            interview,
            uploads: Mutex::new(Vec::new()),
            fail_next_upload: AtomicBool::new(false),
        }
    }
}

impl Gateway for MockGateway {
    async fn fetch_interview(&self, _interview_id: &str) -> AppResult<Interview> {
        Ok(self.interview.clone())
    }

    async fn consume_token(&self, _token: &str) -> AppResult<TokenStatus> {
        Ok(TokenStatus::Accepted)
    }

    async fn validate_setup(&self, _token: &str) -> AppResult<SetupValidation> {
        unimplemented!("not exercised by session tests")
    }

    async fn upload_answer(&self, upload: AnswerUpload<'_>) -> AppResult<()> {
        if self.fail_next_upload.swap(false, Ordering::SeqCst) {
            return Err(AppError::UploadFailed { status: 500 });
        }
        self.uploads.lock().push(UploadRecord {
            question_id: upload.question_id.to_string(),
            tab_switch_count: upload.tab_switch_count,
            total_warnings: upload.total_warnings,
            question_warnings: upload.question_warnings.len(),
            bytes: upload.artifact.len(),
            mime: upload.artifact.mime_type.clone(),
        });
        Ok(())
    }

    async fn submit_setup(&self, _submission: SetupSubmission) -> AppResult<Candidate> {
        unimplemented!("not exercised by session tests")
    }
}

fn two_question_interview() -> Interview {
    Interview {
        interview_id: "iv1".to_string(),
        title: "Backend Engineer".to_string(),
        questions: vec![
            Question {
                id: "q1".to_string(),
                text: "Tell us about yourself".to_string(),
                time_limit: 60,
            },
            Question {
                id: "q2".to_string(),
                text: "Describe a hard bug".to_string(),
                time_limit: 90,
            },
        ],
    }
}

struct Harness {
    media: Arc<FakeMedia>,
    sink_state: Arc<Mutex<SinkState>>,
    fullscreen: Arc<AtomicBool>,
    store: Arc<MemoryStateStore>,
    gateway: Arc<MockGateway>,
    detector: Arc<dyn DetectorFactory>,
}

impl Harness {
    fn new(fullscreen_active: bool) -> Self {
        Self::with_detector(fullscreen_active, Arc::new(FakeDetectorFactory))
    }

    fn with_detector(fullscreen_active: bool, detector: Arc<dyn DetectorFactory>) -> Self {
        Self {
            media: Arc::new(FakeMedia::default()),
            sink_state: Arc::new(Mutex::new(SinkState::default())),
            fullscreen: Arc::new(AtomicBool::new(fullscreen_active)),
            store: Arc::new(MemoryStateStore::new()),
            gateway: Arc::new(MockGateway::new(two_question_interview())),
            detector,
        }
    }

    fn platform(&self) -> SessionPlatform {
        SessionPlatform {
            media: self.media.clone(),
            sink: Box::new(FakeSink(self.sink_state.clone())),
            detector: self.detector.clone(),
            fullscreen: Box::new(FakeFullscreen(self.fullscreen.clone())),
            store: self.store.clone(),
        }
    }

    async fn load(&self) -> InterviewSession<MockGateway> {
        let loaded = InterviewSession::load(
            AppConfig::default(),
            self.gateway.clone(),
            self.platform(),
            "iv1",
            "c1",
            Some("tok"),
        )
        .await
        .expect("load");
        match loaded {
            SessionLoad::Ready(session) => *session,
            SessionLoad::Redirect(r) => panic!("unexpected redirect: {r:?}"),
        }
    }
}

#[tokio::test(start_paused = true)]
async fn full_interview_runs_to_completion() {
    let h = Harness::new(true);
    let mut session = h.load().await;
    assert_eq!(session.stage(), Stage::Question);
    assert_eq!(session.time_left(), 60);

    session.begin().await;
    assert!(h.sink_state.lock().playing);

    // question 1
    assert!(session.start_recording(at(0)).await);
    assert!(session.is_recording());
    session.stop_recording(at(5_000));
    assert_eq!(session.stage(), Stage::Review);
    assert!(session.artifact().is_some());
    // surface switched to playback and the live tracks were stopped
    assert!(h.sink_state.lock().playback_mime.is_some());
    assert!(h.media.last_stream_ended());

    let redirect = session.upload_answer(at(6_000)).await.expect("upload");
    assert!(redirect.is_none());
    assert_eq!(session.stage(), Stage::Question);
    assert_eq!(session.question_index(), 1);
    assert_eq!(session.time_left(), 90);

    // question 2
    assert!(session.start_recording(at(10_000)).await);
    session.stop_recording(at(15_000));
    let redirect = session
        .upload_answer(at(16_000))
        .await
        .expect("upload")
        .expect("terminal redirect");
    assert_eq!(redirect.reason, RedirectReason::Completed);
    assert_eq!(session.stage(), Stage::Done);

    let uploads = h.gateway.uploads.lock();
    assert_eq!(uploads.len(), 2);
    assert_eq!(uploads[0].question_id, "q1");
    assert_eq!(uploads[1].question_id, "q2");
    assert_eq!(uploads[0].bytes, 128);
    assert_eq!(uploads[0].mime, "video/webm;codecs=vp9,opus");
    drop(uploads);

    // progress was cleared and the devices were released
    assert!(h.store.get(&progress_key("iv1", "c1")).is_none());
    assert!(h.media.last_stream_ended());
    assert!(!h.fullscreen.load(Ordering::SeqCst));
    assert!(h.sink_state.lock().attached.is_none());
}

#[tokio::test(start_paused = true)]
async fn failed_upload_keeps_the_take_for_retry() {
    let h = Harness::new(true);
    let mut session = h.load().await;
    session.begin().await;

    assert!(session.start_recording(at(0)).await);
    session.stop_recording(at(5_000));

    h.gateway.fail_next_upload.store(true, Ordering::SeqCst);
    let err = session.upload_answer(at(6_000)).await.unwrap_err();
    assert!(matches!(err, AppError::UploadFailed { status: 500 }));
    assert_eq!(session.stage(), Stage::Review);
    assert!(session.artifact().is_some());
    let banners = session.banners(at(6_100));
    assert!(banners.iter().any(|b| b.message.contains("Upload failed")));

    // the retry succeeds and the session advances
    let redirect = session.upload_answer(at(7_000)).await.expect("retry");
    assert!(redirect.is_none());
    assert_eq!(session.question_index(), 1);
}

#[tokio::test(start_paused = true)]
async fn re_record_discards_the_take_and_restores_the_clock() {
    let h = Harness::new(true);
    let mut session = h.load().await;
    session.begin().await;

    assert!(session.start_recording(at(0)).await);
    for _ in 0..10 {
        session.tick_second(at(0));
    }
    assert_eq!(session.time_left(), 50);
    session.stop_recording(at(10_000));
    assert!(session.artifact().is_some());

    session.re_record().await;
    assert_eq!(session.stage(), Stage::Question);
    assert!(session.artifact().is_none());
    assert_eq!(session.time_left(), 60);
    // a fresh stream replaced the one stopped for playback
    assert!(!h.media.last_stream_ended());
}

#[tokio::test(start_paused = true)]
async fn countdown_stops_the_recording_at_zero() {
    let h = Harness::new(true);
    let mut session = h.load().await;
    session.begin().await;

    assert!(session.start_recording(at(0)).await);
    for i in 0..60 {
        session.tick_second(at(i * 1_000));
    }
    assert_eq!(session.time_left(), 0);
    assert!(!session.is_recording());
    assert_eq!(session.stage(), Stage::Review);
    assert!(session.artifact().is_some());
}

#[tokio::test(start_paused = true)]
async fn recording_is_gated_on_fullscreen() {
    let h = Harness::new(false);
    let mut session = h.load().await;
    session.begin().await;

    assert!(!session.start_recording(at(0)).await);
    assert!(session.fullscreen_gate().is_some());
    assert!(!session.is_recording());

    assert!(session.return_to_fullscreen(at(1_000)));
    assert!(session.fullscreen_gate().is_none());
    assert!(session.start_recording(at(2_000)).await);
}

#[tokio::test(start_paused = true)]
async fn proctoring_evidence_rides_along_with_the_upload() {
    let h = Harness::new(true);
    let mut session = h.load().await;
    session.begin().await;

    session.handle_visibility_hidden(at(1_000));
    session.handle_window_blur(at(2_000));
    assert_eq!(session.tab_switch_count(), 2);

    assert!(session.start_recording(at(3_000)).await);
    session.stop_recording(at(8_000));
    session.upload_answer(at(9_000)).await.expect("upload");

    let uploads = h.gateway.uploads.lock();
    assert_eq!(uploads[0].tab_switch_count, 2);
    assert_eq!(uploads[0].total_warnings, 2);
    assert_eq!(uploads[0].question_warnings, 2);
}

// The 2s persistence gate runs against wall-clock timestamps from the
// monitor task, so this test uses real time instead of the paused clock.
#[tokio::test]
async fn monitor_warnings_are_persisted_on_the_clock_tick() {
    let h = Harness::with_detector(true, Arc::new(EmptyFrameDetectorFactory));
    let mut session = h.load().await;

    assert!(session.start_recording(Utc::now()).await);
    tokio::time::sleep(Duration::from_millis(3_000)).await;
    assert!(session.total_warnings() >= 1);
    // the warning came from the monitor task alone; nothing saved yet
    assert!(h.store.get(&progress_key("iv1", "c1")).is_none());

    session.tick_second(Utc::now());
    let raw = h
        .store
        .get(&progress_key("iv1", "c1"))
        .expect("persisted progress");
    let record: ProgressRecord = serde_json::from_str(&raw).expect("progress json");
    assert!(!record.answer_meta["q1"].warnings.is_empty());
}

#[tokio::test(start_paused = true)]
async fn blocked_preview_refuses_recording_start() {
    let h = Harness::new(true);
    let mut session = h.load().await;
    h.sink_state.lock().play_fails = true;

    assert!(!session.start_recording(at(0)).await);
    assert!(!session.is_recording());
    let banners = session.banners(at(100));
    assert!(banners
        .iter()
        .any(|b| b.message.contains("Unable to start camera/mic")));
}

#[tokio::test(start_paused = true)]
async fn warnings_on_a_restored_question_file_under_its_id() {
    let h = Harness::new(true);
    let seed = ProgressRecord {
        current_index: 1,
        tab_switch_count: 0,
        answer_meta: Default::default(),
        saved_at: 0,
    };
    h.store
        .set(
            &progress_key("iv1", "c1"),
            &serde_json::to_string(&seed).expect("seed json"),
        )
        .expect("seed store");

    let mut session = h.load().await;
    session.begin().await;
    assert_eq!(session.question_index(), 1);
    session.handle_window_blur(at(1_000));

    assert!(session.start_recording(at(2_000)).await);
    session.stop_recording(at(7_000));
    let redirect = session.upload_answer(at(8_000)).await.expect("upload");
    assert!(redirect.is_some());

    let uploads = h.gateway.uploads.lock();
    assert_eq!(uploads[0].question_id, "q2");
    assert_eq!(uploads[0].question_warnings, 1);
}

#[tokio::test(start_paused = true)]
async fn progress_restores_on_reload() {
    let h = Harness::new(true);
    let mut session = h.load().await;
    session.begin().await;

    session.handle_window_blur(at(1_000));
    assert!(session.start_recording(at(2_000)).await);
    session.stop_recording(at(7_000));
    session.upload_answer(at(8_000)).await.expect("upload");
    assert_eq!(session.question_index(), 1);

    // a second load against the same store resumes where we left off
    let resumed = h.load().await;
    assert_eq!(resumed.question_index(), 1);
    assert_eq!(resumed.time_left(), 90);
    assert_eq!(resumed.tab_switch_count(), 1);
}
