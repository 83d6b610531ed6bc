//! Suspend/resume protocol tests: interrupt, persist, resume, complete

use agentmap_checkpoint::{InMemorySaver, MemoryDocumentStore};
use agentmap_core::{
    EngineConfig, ExecutionState, ThreadStatus, WorkflowOrchestrator,
};
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::Arc;

fn write_csv(dir: &Path, content: &str) -> PathBuf {
    let path = dir.join("workflow.csv");
    std::fs::write(&path, content).unwrap();
    path
}

fn orchestrator(dir: &Path) -> WorkflowOrchestrator {
    let config = EngineConfig {
        cache_dir: dir.join("cache"),
        prompts_dir: dir.join("prompts"),
        storage_dir: dir.join("storage"),
        success_policy: "all_nodes".to_string(),
    };
    WorkflowOrchestrator::builder(config)
        .with_checkpointer(Arc::new(InMemorySaver::new()))
        .with_documents(Arc::new(MemoryDocumentStore::new()))
        .build()
        .unwrap()
}

const APPROVAL_CSV: &str = "GraphName,Node,AgentType,Prompt,Output_Field,Edge\n\
     G,Start,echo,,started,Approve\n\
     G,Approve,human,Approve the change?,approval,Finish\n\
     G,Finish,echo,,finished,\n";

#[tokio::test]
async fn suspend_then_resume_completes_the_workflow() {
    let dir = tempfile::tempdir().unwrap();
    let csv = write_csv(dir.path(), APPROVAL_CSV);
    let orchestrator = orchestrator(dir.path());

    // First run suspends at the approval node
    let suspended = orchestrator
        .execute_workflow(&csv, Some("G"), ExecutionState::new(), false)
        .await
        .unwrap();

    assert!(!suspended.success);
    assert!(suspended.error.is_none());
    assert_eq!(suspended.final_state["__interrupted"], json!(true));
    let thread_id = suspended.final_state["__thread_id"]
        .as_str()
        .unwrap()
        .to_string();

    let metadata = orchestrator
        .interaction_handler()
        .get_thread(&thread_id)
        .await
        .unwrap()
        .expect("thread metadata persisted");
    assert_eq!(metadata.status, ThreadStatus::Suspended);
    assert_eq!(metadata.node_name.as_deref(), Some("Approve"));
    let request_id = metadata.pending_interaction_id.clone().unwrap();

    let request = orchestrator
        .interaction_handler()
        .get_request(&request_id)
        .await
        .unwrap()
        .expect("interaction request persisted");
    assert_eq!(request.node_name, "Approve");
    assert_eq!(request.prompt, "Approve the change?");

    // Resume with an approval
    let resumed = orchestrator
        .resume(&thread_id, "approve", None)
        .await
        .unwrap();

    assert!(resumed.success);
    assert!(resumed.final_state.contains_key("finished"));
    assert_eq!(resumed.final_state["approval"]["action"], json!("approve"));

    let metadata = orchestrator
        .interaction_handler()
        .get_thread(&thread_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(metadata.status, ThreadStatus::Completed);
    assert!(metadata.pending_interaction_id.is_none());

    // Across both runs, every node executed exactly once
    let mut all_nodes: Vec<String> = suspended
        .execution_summary
        .node_executions
        .iter()
        .chain(resumed.execution_summary.node_executions.iter())
        .map(|e| e.node_name.clone())
        .collect();
    all_nodes.sort();
    assert_eq!(all_nodes, vec!["Approve", "Finish", "Start"]);
}

#[tokio::test]
async fn duplicate_resume_is_a_noop() {
    let dir = tempfile::tempdir().unwrap();
    let csv = write_csv(dir.path(), APPROVAL_CSV);
    let orchestrator = orchestrator(dir.path());

    let suspended = orchestrator
        .execute_workflow(&csv, Some("G"), ExecutionState::new(), false)
        .await
        .unwrap();
    let thread_id = suspended.final_state["__thread_id"]
        .as_str()
        .unwrap()
        .to_string();

    let first = orchestrator
        .resume(&thread_id, "approve", None)
        .await
        .unwrap();
    assert!(first.success);

    // The second submission does not re-execute anything
    let second = orchestrator
        .resume(&thread_id, "approve", None)
        .await
        .unwrap();
    assert!(second.success);
    assert!(second.execution_summary.node_executions.is_empty());
}

#[tokio::test]
async fn resume_of_unknown_thread_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let orchestrator = orchestrator(dir.path());
    let err = orchestrator
        .resume("no-such-thread", "approve", None)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("unknown thread"));
}

#[tokio::test]
async fn resume_carries_response_data_into_state() {
    let dir = tempfile::tempdir().unwrap();
    let csv = write_csv(
        dir.path(),
        "GraphName,Node,AgentType,Context,Prompt,Output_Field,Edge\n\
         G,Ask,human,\"{\"\"interaction_type\"\": \"\"text_input\"\", \"\"timeout_seconds\"\": 120}\",What is your name?,answer,Use\n\
         G,Use,echo,,,\n",
    );
    let orchestrator = orchestrator(dir.path());

    let suspended = orchestrator
        .execute_workflow(&csv, Some("G"), ExecutionState::new(), false)
        .await
        .unwrap();
    let thread_id = suspended.final_state["__thread_id"]
        .as_str()
        .unwrap()
        .to_string();

    // The advisory timeout travels from the request onto the thread record
    let metadata = orchestrator
        .interaction_handler()
        .get_thread(&thread_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(metadata.timeout_seconds, Some(120));

    let resumed = orchestrator
        .resume(&thread_id, "submit", Some(json!("Ada")))
        .await
        .unwrap();
    assert!(resumed.success);
    assert_eq!(resumed.final_state["answer"]["data"], json!("Ada"));

    // Completion clears the pending interaction and its deadline
    let metadata = orchestrator
        .interaction_handler()
        .get_thread(&thread_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(metadata.timeout_seconds, None);
}

#[tokio::test]
async fn resumed_state_matches_uninterrupted_shape() {
    let dir = tempfile::tempdir().unwrap();
    let csv = write_csv(dir.path(), APPROVAL_CSV);
    let orchestrator = orchestrator(dir.path());

    let suspended = orchestrator
        .execute_workflow(&csv, Some("G"), ExecutionState::new(), false)
        .await
        .unwrap();
    let thread_id = suspended.final_state["__thread_id"]
        .as_str()
        .unwrap()
        .to_string();
    let resumed = orchestrator
        .resume(&thread_id, "approve", None)
        .await
        .unwrap();

    // State written before the interrupt survives the round trip, and the
    // post-interrupt nodes ran
    assert!(resumed.final_state.contains_key("started"));
    assert!(resumed.final_state.contains_key("finished"));
    assert!(!resumed
        .final_state
        .get("__interrupted")
        .is_some_and(|v| v == &json!(true)));
}
