//! The single owner of client-side story state.
//!
//! Mission and world state live in one `Session` behind a lock; every change
//! goes through a method here and is written to the store at that boundary.
//! `generate_chapter` holds an in-flight flag for the whole call, which plays
//! the role of the disabled "generate" button.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use serde::de::DeserializeOwned;
use tokio::sync::RwLock;
use tracing::{info, instrument, warn};

use super::store::{StateStore, MISSION_KEY, STORY_KEY};
use super::transport::ChapterTransport;
use super::ClientError;
use crate::domain::{ChapterRecord, TeacherMission, WorldState};
use crate::protocol::{GenerateChapterRequest, GenerateChapterResponse};

/// What the student typed for this turn.
#[derive(Clone, Debug, Default)]
pub struct StudentTurn {
    pub prompt: String,
    pub student_name: String,
    /// Steer the story with `prompt` instead of continuing it.
    pub new_direction: bool,
}

impl StudentTurn {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self { prompt: prompt.into(), ..Default::default() }
    }

    /// Continue the story without new input.
    pub fn continue_story() -> Self {
        Self::default()
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.student_name = name.into();
        self
    }

    pub fn as_new_direction(mut self) -> Self {
        self.new_direction = true;
        self
    }
}

/// Entry of the "show chapter" dropdown.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChapterOption {
    pub chapter_index: u32,
    pub label: String,
}

#[derive(Debug, Default)]
struct Session {
    mission: Option<TeacherMission>,
    world: WorldState,
    selected: Option<u32>,
    status: String,
}

pub struct StoryCoordinator {
    store: Arc<dyn StateStore>,
    transport: Arc<dyn ChapterTransport>,
    session: RwLock<Session>,
    in_flight: AtomicBool,
}

impl StoryCoordinator {
    /// Restore mission and story from the store. Unreadable entries count as absent.
    pub fn load(store: Arc<dyn StateStore>, transport: Arc<dyn ChapterTransport>) -> Self {
        let mission = read_json::<TeacherMission>(store.as_ref(), MISSION_KEY);
        let world = read_json::<WorldState>(store.as_ref(), STORY_KEY).unwrap_or_default();
        let selected = world.last_chapter().map(|c| c.chapter_index);
        info!(
            target: "storyengine",
            has_mission = mission.is_some(),
            chapters = world.previous_chapters.len(),
            "Client state loaded"
        );
        Self {
            store,
            transport,
            session: RwLock::new(Session { mission, world, selected, status: String::new() }),
            in_flight: AtomicBool::new(false),
        }
    }

    pub async fn mission(&self) -> Option<TeacherMission> {
        self.session.read().await.mission.clone()
    }

    pub async fn world(&self) -> WorldState {
        self.session.read().await.world.clone()
    }

    /// Text for the status area.
    pub async fn status(&self) -> String {
        self.session.read().await.status.clone()
    }

    /// True while a generation call is in flight (trigger disabled).
    pub fn is_busy(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Store a new mission. A new mission always starts a new story.
    #[instrument(level = "info", skip(self, mission), fields(topic = %mission.topic))]
    pub async fn save_mission(&self, mission: TeacherMission) -> Result<(), ClientError> {
        let mut s = self.session.write().await;
        self.store.save(MISSION_KEY, &serde_json::to_string(&mission)?)?;
        self.store.remove(STORY_KEY)?;
        s.mission = Some(mission);
        s.world = WorldState::default();
        s.selected = None;
        s.status = "Mission saved. The next chapter starts a new story.".into();
        Ok(())
    }

    /// Clear the story and the chapter on display; the mission stays.
    #[instrument(level = "info", skip(self))]
    pub async fn reset_story(&self) -> Result<(), ClientError> {
        let mut s = self.session.write().await;
        self.store.remove(STORY_KEY)?;
        s.world = WorldState::default();
        s.selected = None;
        s.status = "Story cleared.".into();
        Ok(())
    }

    /// Ask the endpoint for the next chapter and adopt its world state wholesale.
    #[instrument(level = "info", skip(self, turn), fields(prompt_len = turn.prompt.len(), new_direction = turn.new_direction))]
    pub async fn generate_chapter(&self, turn: StudentTurn) -> Result<GenerateChapterResponse, ClientError> {
        let _guard = InFlight::acquire(&self.in_flight).ok_or(ClientError::Busy)?;

        let request = {
            let mut s = self.session.write().await;
            match compose_request(&s, &turn) {
                Ok(req) => {
                    s.status = "Generating chapter…".into();
                    req
                }
                Err(e) => {
                    s.status = e.to_string();
                    return Err(e);
                }
            }
        };

        let result = self.transport.generate(&request).await;

        let mut s = self.session.write().await;
        let resp = match result {
            Ok(resp) => resp,
            Err(e) => {
                warn!(target: "storyengine", error = %e, "Chapter generation failed");
                s.status = e.to_string();
                return Err(e);
            }
        };

        // Disk first: a failed write leaves the session on the previous chapter.
        if let Err(e) = self.persist_world(&resp.worldstate) {
            warn!(target: "storyengine", error = %e, "Could not store the new chapter");
            s.status = e.to_string();
            return Err(e);
        }
        s.world = resp.worldstate.clone();
        s.selected = Some(resp.chapter_index);
        s.status = format!("Chapter {} generated.", resp.chapter_index);
        info!(target: "storyengine", chapter_index = resp.chapter_index, "Chapter stored locally");
        Ok(resp)
    }

    /// Dropdown entries, one per chapter in history order.
    pub async fn chapter_options(&self) -> Vec<ChapterOption> {
        self.session
            .read()
            .await
            .world
            .previous_chapters
            .iter()
            .map(|c| ChapterOption { chapter_index: c.chapter_index, label: option_label(c) })
            .collect()
    }

    /// Show an earlier chapter again. No endpoint call.
    pub async fn select_chapter(&self, chapter_index: u32) -> Option<ChapterRecord> {
        let mut s = self.session.write().await;
        let record = s.world.chapter(chapter_index).cloned()?;
        s.selected = Some(chapter_index);
        Some(record)
    }

    pub async fn selected_chapter(&self) -> Option<ChapterRecord> {
        let s = self.session.read().await;
        s.selected.and_then(|i| s.world.chapter(i).cloned())
    }

    fn persist_world(&self, world: &WorldState) -> Result<(), ClientError> {
        self.store.save(STORY_KEY, &serde_json::to_string(world)?)?;
        Ok(())
    }
}

fn compose_request(s: &Session, turn: &StudentTurn) -> Result<GenerateChapterRequest, ClientError> {
    let mission = s.mission.clone().ok_or(ClientError::NoMission)?;
    let prompt = turn.prompt.trim().to_string();
    let first_chapter = s.world.chapter_index == 0;
    if first_chapter && prompt.is_empty() {
        return Err(ClientError::EmptyPrompt);
    }
    Ok(GenerateChapterRequest {
        teacher_mission: Some(mission),
        use_new_direction: !first_chapter && turn.new_direction && !prompt.is_empty(),
        student_prompt: prompt,
        student_name: turn.student_name.trim().to_string(),
        worldstate: s.world.clone(),
    })
}

fn option_label(c: &ChapterRecord) -> String {
    let summary = c.display_summary();
    let preview: String = summary.chars().take(40).collect();
    if preview.is_empty() {
        format!("Chapter {}", c.chapter_index)
    } else if preview.len() < summary.len() {
        format!("Chapter {}: {}…", c.chapter_index, preview.trim_end())
    } else {
        format!("Chapter {}: {}", c.chapter_index, preview)
    }
}

fn read_json<T: DeserializeOwned>(store: &dyn StateStore, key: &str) -> Option<T> {
    let raw = store.load(key)?;
    match serde_json::from_str(&raw) {
        Ok(v) => Some(v),
        Err(e) => {
            warn!(target: "storyengine", %key, error = %e, "Ignoring unreadable stored state");
            None
        }
    }
}

/// Clears the in-flight flag when dropped, whatever way the call ends.
struct InFlight<'a>(&'a AtomicBool);

impl<'a> InFlight<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::store::MemoryStore;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use tokio::sync::Notify;

    /// Plays the endpoint: appends chapter `n + 1` to the incoming world.
    #[derive(Default)]
    struct ScriptedTransport {
        requests: Mutex<Vec<GenerateChapterRequest>>,
        fail_with: Option<(u16, String)>,
        gate: Option<Arc<Notify>>,
    }

    impl ScriptedTransport {
        fn calls(&self) -> usize {
            self.requests.lock().unwrap().len()
        }

        fn last(&self) -> GenerateChapterRequest {
            self.requests.lock().unwrap().last().cloned().unwrap()
        }
    }

    #[async_trait]
    impl ChapterTransport for ScriptedTransport {
        async fn generate(&self, req: &GenerateChapterRequest) -> Result<GenerateChapterResponse, ClientError> {
            self.requests.lock().unwrap().push(req.clone());
            if let Some(gate) = &self.gate {
                gate.notified().await;
            }
            if let Some((status, message)) = &self.fail_with {
                return Err(ClientError::Endpoint { status: *status, message: message.clone() });
            }
            let index = req.worldstate.chapter_index + 1;
            let summary = format!("Summary {index}.\nSTATE: {{}}");
            let mut world = req.worldstate.clone();
            world.upsert_chapter(ChapterRecord {
                chapter_index: index,
                chapter_text: format!("Chapter text {index}"),
                reflection_questions: vec!["a".into(), "b".into(), "c".into()],
                short_summary: summary.clone(),
            });
            world.chapter_index = index;
            world.summary_for_next = summary;
            Ok(GenerateChapterResponse {
                chapter_index: index,
                chapter_text: format!("Chapter text {index}"),
                reflection_questions: vec!["a".into(), "b".into(), "c".into()],
                worldstate: world,
            })
        }
    }

    fn mission() -> TeacherMission {
        TeacherMission { topic: "Honeybees".into(), max_chapters: Some(4), ..Default::default() }
    }

    fn coordinator(store: Arc<MemoryStore>, transport: Arc<ScriptedTransport>) -> StoryCoordinator {
        StoryCoordinator::load(store, transport)
    }

    #[tokio::test]
    async fn malformed_stored_state_is_treated_as_absent() {
        let store = Arc::new(MemoryStore::new());
        store.save(MISSION_KEY, "{not json").unwrap();
        store.save(STORY_KEY, "[]").unwrap();

        let c = coordinator(store, Arc::new(ScriptedTransport::default()));
        assert_eq!(c.mission().await, None);
        assert_eq!(c.world().await, WorldState::default());
    }

    #[tokio::test]
    async fn saving_a_mission_starts_a_new_story() {
        let store = Arc::new(MemoryStore::new());
        let transport = Arc::new(ScriptedTransport::default());
        let c = coordinator(store.clone(), transport.clone());
        c.save_mission(mission()).await.unwrap();
        c.generate_chapter(StudentTurn::new("a lost queen")).await.unwrap();
        assert_eq!(c.world().await.chapter_index, 1);

        c.save_mission(TeacherMission { topic: "Ants".into(), ..Default::default() }).await.unwrap();
        assert_eq!(c.world().await, WorldState::default());
        assert_eq!(c.selected_chapter().await, None);
        assert_eq!(store.load(STORY_KEY), None);

        let reloaded = coordinator(store, transport);
        assert_eq!(reloaded.mission().await.map(|m| m.topic), Some("Ants".to_string()));
        assert_eq!(reloaded.world().await.chapter_index, 0);
    }

    #[tokio::test]
    async fn guards_run_before_any_network_call() {
        let transport = Arc::new(ScriptedTransport::default());
        let c = coordinator(Arc::new(MemoryStore::new()), transport.clone());

        let err = c.generate_chapter(StudentTurn::new("idea")).await.unwrap_err();
        assert!(matches!(err, ClientError::NoMission));
        assert_eq!(c.status().await, err.to_string());

        c.save_mission(mission()).await.unwrap();
        let err = c.generate_chapter(StudentTurn::new("   ")).await.unwrap_err();
        assert!(matches!(err, ClientError::EmptyPrompt));
        assert_eq!(transport.calls(), 0);
        assert!(!c.is_busy());
    }

    #[tokio::test]
    async fn successful_turns_replace_and_persist_world_state() {
        let store = Arc::new(MemoryStore::new());
        let transport = Arc::new(ScriptedTransport::default());
        let c = coordinator(store.clone(), transport.clone());
        c.save_mission(mission()).await.unwrap();

        let first = c.generate_chapter(StudentTurn::new(" a lost queen ").named("Mo")).await.unwrap();
        assert_eq!(first.chapter_index, 1);
        let sent = transport.last();
        assert_eq!(sent.student_prompt, "a lost queen");
        assert_eq!(sent.student_name, "Mo");
        assert!(!sent.use_new_direction);

        c.generate_chapter(StudentTurn::continue_story()).await.unwrap();
        let sent = transport.last();
        assert_eq!(sent.worldstate.chapter_index, 1);
        assert_eq!(sent.student_prompt, "");
        assert!(!sent.use_new_direction);

        c.generate_chapter(StudentTurn::new("a storm").as_new_direction()).await.unwrap();
        assert!(transport.last().use_new_direction);

        let world = c.world().await;
        assert_eq!(world.chapter_index, 3);
        assert_eq!(world.previous_chapters.len(), 3);
        assert_eq!(c.selected_chapter().await.map(|r| r.chapter_index), Some(3));
        assert_eq!(c.status().await, "Chapter 3 generated.");

        let stored: WorldState = serde_json::from_str(&store.load(STORY_KEY).unwrap()).unwrap();
        assert_eq!(stored, world);
    }

    #[tokio::test]
    async fn endpoint_errors_surface_in_status_and_release_the_trigger() {
        let transport = Arc::new(ScriptedTransport {
            fail_with: Some((400, "Max number of chapters reached (4).".into())),
            ..Default::default()
        });
        let c = coordinator(Arc::new(MemoryStore::new()), transport.clone());
        c.save_mission(mission()).await.unwrap();

        let err = c.generate_chapter(StudentTurn::new("idea")).await.unwrap_err();
        assert!(matches!(err, ClientError::Endpoint { status: 400, .. }));
        assert_eq!(c.status().await, "Max number of chapters reached (4). (400)");
        assert!(!c.is_busy());
        assert_eq!(c.world().await, WorldState::default());
        assert_eq!(transport.calls(), 1);
    }

    #[tokio::test]
    async fn second_trigger_while_in_flight_is_refused() {
        let gate = Arc::new(Notify::new());
        let transport = Arc::new(ScriptedTransport { gate: Some(gate.clone()), ..Default::default() });
        let c = Arc::new(coordinator(Arc::new(MemoryStore::new()), transport.clone()));
        c.save_mission(mission()).await.unwrap();

        let running = {
            let c = c.clone();
            tokio::spawn(async move { c.generate_chapter(StudentTurn::new("idea")).await })
        };
        while transport.calls() == 0 {
            tokio::task::yield_now().await;
        }
        assert!(c.is_busy());
        let err = c.generate_chapter(StudentTurn::new("idea")).await.unwrap_err();
        assert!(matches!(err, ClientError::Busy));

        gate.notify_one();
        let first = running.await.unwrap().unwrap();
        assert_eq!(first.chapter_index, 1);
        assert_eq!(transport.calls(), 1);
        assert!(!c.is_busy());
    }

    #[tokio::test]
    async fn reset_keeps_the_mission() {
        let store = Arc::new(MemoryStore::new());
        let c = coordinator(store.clone(), Arc::new(ScriptedTransport::default()));
        c.save_mission(mission()).await.unwrap();
        c.generate_chapter(StudentTurn::new("idea")).await.unwrap();

        c.reset_story().await.unwrap();
        assert_eq!(c.world().await, WorldState::default());
        assert_eq!(c.selected_chapter().await, None);
        assert_eq!(c.mission().await, Some(mission()));
        assert!(store.load(MISSION_KEY).is_some());
        assert_eq!(store.load(STORY_KEY), None);
    }

    #[tokio::test]
    async fn earlier_chapters_are_redisplayed_without_a_call() {
        let transport = Arc::new(ScriptedTransport::default());
        let c = coordinator(Arc::new(MemoryStore::new()), transport.clone());
        c.save_mission(mission()).await.unwrap();
        c.generate_chapter(StudentTurn::new("idea")).await.unwrap();
        c.generate_chapter(StudentTurn::continue_story()).await.unwrap();

        let options = c.chapter_options().await;
        assert_eq!(options.len(), 2);
        assert_eq!(options[0].label, "Chapter 1: Summary 1.");

        let shown = c.select_chapter(1).await.unwrap();
        assert_eq!(shown.chapter_text, "Chapter text 1");
        assert_eq!(c.selected_chapter().await.map(|r| r.chapter_index), Some(1));
        assert_eq!(c.select_chapter(9).await, None);
        assert_eq!(transport.calls(), 2);
    }

    /// Memory store whose story writes can be switched off.
    #[derive(Default)]
    struct ReadOnlyAfter {
        inner: MemoryStore,
        locked: AtomicBool,
    }

    impl StateStore for ReadOnlyAfter {
        fn load(&self, key: &str) -> Option<String> {
            self.inner.load(key)
        }

        fn save(&self, key: &str, value: &str) -> std::io::Result<()> {
            if key == STORY_KEY && self.locked.load(Ordering::Acquire) {
                return Err(std::io::Error::new(std::io::ErrorKind::PermissionDenied, "disk is read-only"));
            }
            self.inner.save(key, value)
        }

        fn remove(&self, key: &str) -> std::io::Result<()> {
            self.inner.remove(key)
        }
    }

    #[tokio::test]
    async fn failed_write_keeps_the_previous_chapter() {
        let store = Arc::new(ReadOnlyAfter::default());
        let c = StoryCoordinator::load(store.clone(), Arc::new(ScriptedTransport::default()));
        c.save_mission(mission()).await.unwrap();
        c.generate_chapter(StudentTurn::new("idea")).await.unwrap();
        let before = c.world().await;

        store.locked.store(true, Ordering::Release);
        let err = c.generate_chapter(StudentTurn::continue_story()).await.unwrap_err();
        assert!(matches!(err, ClientError::Storage(_)));
        assert_eq!(c.world().await, before);
        assert_eq!(c.selected_chapter().await.map(|r| r.chapter_index), Some(1));
        assert!(c.status().await.contains("read-only"));

        let stored: WorldState = serde_json::from_str(&store.load(STORY_KEY).unwrap()).unwrap();
        assert_eq!(stored, before);
        assert!(!c.is_busy());
    }
}
