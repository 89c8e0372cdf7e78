use dc_cli::components::Operation;
use dc_cli::runner::CommandOutput;
use dc_cli::test_utils::{RecordingRunner, test_collaborators_with};
use std::sync::Arc;

use crate::common::{GO_FUNCTION, TestProject};

async fn services() -> TestProject {
    let project = TestProject::new("shop").await.unwrap();
    project.write("services/orders/lambda-func.config.yml", GO_FUNCTION).await.unwrap();
    project
        .write("services/users/lambda-func.config.yml", "name: get-user\nsettings:\n  language: python\n")
        .await
        .unwrap();
    project.write("services/users/handler.py", "def handler(event, context):\n    return {}\n").await.unwrap();
    project.write("web/js-client.config.yml", "name: storefront\nsettings:\n  port: 3000\n").await.unwrap();
    project
}

#[tokio::test]
async fn test_build_runs_every_component_in_the_subtree() {
    let project = services().await;
    let runner = Arc::new(RecordingRunner::default());
    let opened = project.open("services", test_collaborators_with(runner.clone())).await.unwrap();

    let result = opened.tree.build(opened.tree.focus()).await;

    assert!(result.success());
    assert_eq!(result.operation, Operation::Build);
    let names: Vec<&str> = result.outcomes.iter().map(|o| o.component.as_str()).collect();
    assert_eq!(names, vec!["get-order", "get-user"]);

    let commands = runner.commands();
    assert!(commands.iter().any(|c| c.contains("golang:1.22 build")));
    assert!(project.root().join("services/users/.out/handler.py").exists());
}

#[tokio::test]
async fn test_failing_component_fails_the_aggregate() {
    let project = services().await;
    let runner = Arc::new(RecordingRunner::default().with_output("test ./...", CommandOutput::failed(1, "FAIL orders")));
    let opened = project.open("services", test_collaborators_with(runner.clone())).await.unwrap();

    let result = opened.tree.test(opened.tree.focus()).await;

    assert!(!result.success());
    assert_eq!(result.outcomes.len(), 2);
    assert_eq!(result.failures().count(), 1);
    assert!(result.outcomes[0].output().contains("FAIL orders"));
    assert!(result.outcomes[1].succeeded());
    assert!(result.ensure_success(&opened.focus_path()).is_err());
}

#[tokio::test]
async fn test_stop_with_nothing_running_is_a_no_op() {
    let project = services().await;
    let runner = Arc::new(RecordingRunner::default());
    let opened = project.open("services", test_collaborators_with(runner.clone())).await.unwrap();

    let result = opened.tree.stop(opened.tree.focus()).await;

    assert!(result.success());
    assert!(runner.commands().is_empty());
}

#[tokio::test]
async fn test_client_start_runs_a_named_container() {
    let project = services().await;
    let runner = Arc::new(RecordingRunner::default());
    let opened = project.open("web", test_collaborators_with(runner.clone())).await.unwrap();

    let result = opened.tree.start(opened.tree.focus(), &opened.settings).await;

    assert!(result.success(), "{:?}", result.outcomes.iter().map(|o| o.output()).collect::<Vec<_>>());
    assert!(runner.commands().iter().any(|c| c.contains("client-storefront")));
}
