//! CLI-level integration: the same pipeline the binary drives, end to end

use agentmap_core::{EngineConfig, ExecutionState, WorkflowOrchestrator};
use std::path::Path;

fn orchestrator(dir: &Path) -> WorkflowOrchestrator {
    let config = EngineConfig {
        cache_dir: dir.join("cache"),
        prompts_dir: dir.join("prompts"),
        storage_dir: dir.join("storage"),
        success_policy: "all_nodes".to_string(),
    };
    WorkflowOrchestrator::builder(config).build().unwrap()
}

#[tokio::test]
async fn run_compile_resume_pipeline_with_file_backends() {
    let dir = tempfile::tempdir().unwrap();
    let csv = dir.path().join("workflow.csv");
    std::fs::write(
        &csv,
        "GraphName,Node,AgentType,Prompt,Output_Field,Edge\n\
         Flow,Start,echo,,started,Gate\n\
         Flow,Gate,human,Continue?,approval,End\n\
         Flow,End,echo,,done,\n",
    )
    .unwrap();

    let orchestrator = orchestrator(dir.path());

    // Compile warms the cache on disk
    let (bundle, _) = orchestrator.compile(&csv, Some("Flow")).unwrap();
    assert!(orchestrator
        .bundle_store()
        .bundle_path(&bundle.csv_hash, "Flow")
        .exists());

    // Run suspends at the gate; everything persisted to the filesystem
    let suspended = orchestrator
        .execute_workflow(&csv, Some("Flow"), ExecutionState::new(), true)
        .await
        .unwrap();
    assert!(!suspended.success);
    let thread_id = suspended.final_state["__thread_id"].as_str().unwrap();

    // A second orchestrator over the same directories resumes the thread,
    // proving the thread metadata, bundle and checkpoints are durable
    let second = self::orchestrator(dir.path());
    let resumed = second.resume(thread_id, "approve", None).await.unwrap();
    assert!(resumed.success);
    assert!(resumed.final_state.contains_key("done"));
}
