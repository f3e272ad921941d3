//! End-to-end: coordinator -> HTTP transport -> real listener -> router.

mod common;

use std::sync::Arc;

use serde_json::{json, Value};
use tokio::net::TcpListener;

use common::{chapter_reply, mission, state_with, ScriptedModel};
use storyengine_backend::client::{
    ClientError, FileStore, HttpTransport, StateStore, StoryCoordinator, StudentTurn, STORY_KEY,
};
use storyengine_backend::domain::TeacherMission;
use storyengine_backend::routes::build_router;

async fn spawn_server(model: Arc<ScriptedModel>) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = build_router(state_with(Some(model)));
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

fn teacher_mission(max_chapters: i64) -> TeacherMission {
    let mut m = mission("Bees");
    m["maxChapters"] = json!(max_chapters);
    serde_json::from_value(m).unwrap()
}

#[tokio::test]
async fn story_survives_a_restart_and_respects_the_limit() {
    let model = ScriptedModel::always(chapter_reply(
        "A chapter about bees.",
        &["Q1?", "Q2?", "Q3?"],
        "The bees trust you.\nSTATE: {\"queen\":\"found\"}",
    ));
    let base = spawn_server(model.clone()).await;
    let dir = tempfile::tempdir().unwrap();
    let store: Arc<dyn StateStore> = Arc::new(FileStore::new(dir.path()));

    let coordinator = StoryCoordinator::load(store.clone(), Arc::new(HttpTransport::new(&base)));
    coordinator.save_mission(teacher_mission(2)).await.unwrap();

    let first = coordinator
        .generate_chapter(StudentTurn::new("I shrink to bee size").named("Alex"))
        .await
        .unwrap();
    assert_eq!(first.chapter_index, 1);
    assert_eq!(coordinator.status().await, "Chapter 1 generated.");

    // A fresh coordinator over the same directory picks up where we left off.
    let restarted = StoryCoordinator::load(store.clone(), Arc::new(HttpTransport::new(&base)));
    assert_eq!(restarted.world().await.chapter_index, 1);
    assert_eq!(restarted.mission().await.unwrap().topic, "Bees");

    let second = restarted.generate_chapter(StudentTurn::continue_story()).await.unwrap();
    assert_eq!(second.chapter_index, 2);
    assert_eq!(second.worldstate.previous_chapters.len(), 2);

    // Locked facts from chapter 1 reach the prompt for chapter 2.
    let brief: Value = serde_json::from_str(&model.last_prompt().user).unwrap();
    assert_eq!(brief["lockedState"]["queen"], "found");
    assert_eq!(brief["studentPrompt"], "");

    let stored: Value = serde_json::from_slice(&std::fs::read(dir.path().join(format!("{STORY_KEY}.json"))).unwrap()).unwrap();
    assert_eq!(stored["chapterIndex"], 2);

    let err = restarted.generate_chapter(StudentTurn::continue_story()).await.unwrap_err();
    match err {
        ClientError::Endpoint { status, ref message } => {
            assert_eq!(status, 400);
            assert!(!message.is_empty());
        }
        other => panic!("expected endpoint error, got {other:?}"),
    }
    assert_eq!(model.calls(), 2);
    // Nothing is lost after a rejected turn.
    assert_eq!(restarted.world().await.previous_chapters.len(), 2);
}

#[tokio::test]
async fn unreachable_endpoint_is_a_transport_error() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let dir = tempfile::tempdir().unwrap();
    let coordinator = StoryCoordinator::load(
        Arc::new(FileStore::new(dir.path())),
        Arc::new(HttpTransport::new(&format!("http://{addr}"))),
    );
    coordinator.save_mission(teacher_mission(0)).await.unwrap();

    let err = coordinator.generate_chapter(StudentTurn::new("go")).await.unwrap_err();
    assert!(matches!(err, ClientError::Transport(_)));
    assert!(!coordinator.is_busy());
    assert_eq!(coordinator.world().await.chapter_index, 0);
}
