use dc_cli::components::{Buildable, ComponentKind, Direction, HasHttpEndpoint};
use dc_cli::test_utils::test_collaborators;

use crate::common::{GO_FUNCTION, ORDERS_TEMPLATE, TestProject, USERS_TEMPLATE};

/// A project with an emulator at the root, services below and a web client.
async fn shop() -> TestProject {
    let project = TestProject::new("shop").await.unwrap();
    project
        .write("cloudformation-stack.config.yml", "name: local\nsettings:\n  services:\n    - serverless\n")
        .await
        .unwrap();
    project.write("services/orders/lambda-func.config.yml", GO_FUNCTION).await.unwrap();
    project.write("services/orders/orders.cf.yml", ORDERS_TEMPLATE).await.unwrap();
    project.write("services/users/users.cf.yml", USERS_TEMPLATE).await.unwrap();
    project.write("web/js-client.config.yml", "name: storefront\nsettings:\n  port: 3000\n").await.unwrap();
    project.write("web/node_modules/left-pad/lambda-func.config.yml", "name: ignored\n").await.unwrap();
    project
}

#[tokio::test]
async fn test_discovers_components_across_the_project() {
    let project = shop().await;
    let opened = project.open("", test_collaborators()).await.unwrap();
    let tree = &opened.tree;

    let kinds: Vec<ComponentKind> = tree.components(tree.root()).iter().map(|c| c.kind()).collect();
    assert_eq!(kinds, vec![ComponentKind::CloudformationStack]);

    let buildable = tree.find_all::<dyn Buildable>(tree.root(), Direction::In);
    let names: Vec<&str> = buildable.iter().map(|f| f.component.name()).collect();
    assert_eq!(names, vec!["get-order", "storefront"]);

    let endpoints = tree.find_all::<dyn HasHttpEndpoint>(tree.root(), Direction::In);
    assert_eq!(endpoints.len(), 1);
    assert_eq!(endpoints[0].component.port(), 3000);
}

#[tokio::test]
async fn test_ignored_directories_are_not_part_of_the_tree() {
    let project = shop().await;
    let opened = project.open("", test_collaborators()).await.unwrap();

    assert!(opened.tree.find(&project.root().join("web")).is_some());
    assert!(opened.tree.find(&project.root().join("web/node_modules")).is_none());
}

#[tokio::test]
async fn test_tree_is_focused_on_the_start_directory() {
    let project = shop().await;
    let opened = project.open("services/orders", test_collaborators()).await.unwrap();

    assert_eq!(opened.focus_path(), project.root().join("services/orders"));
    assert_eq!(opened.tree.path(opened.tree.root()), project.root());

    let found = opened.tree.find_all::<dyn Buildable>(opened.tree.focus(), Direction::In);
    assert_eq!(found.len(), 1);
}

#[tokio::test]
async fn test_project_template_merges_every_fragment() {
    let project = shop().await;
    let opened = project.open("", test_collaborators()).await.unwrap();

    let merged = opened.tree.merged_template(opened.tree.root(), &opened.settings).await.unwrap();

    assert!(merged.resources.contains_key("OrdersTable"));
    assert!(merged.resources.contains_key("GetOrder"));
    assert!(merged.resources.contains_key("UsersBucket"));
    assert!(merged.parameters.contains_key("OrdersTableName"));
}

#[tokio::test]
async fn test_child_config_overrides_templates_beneath_it() {
    let project = shop().await;
    project
        .write(
            "services/billing.childconfig.yml",
            "name: billing\noverrides:\n  - type: AWS::DynamoDB::Table\n    properties:\n      BillingMode: PAY_PER_REQUEST\n",
        )
        .await
        .unwrap();
    let opened = project.open("", test_collaborators()).await.unwrap();

    let merged = opened.tree.merged_template(opened.tree.root(), &opened.settings).await.unwrap();

    let table = &merged.resources["OrdersTable"];
    assert_eq!(table.property("BillingMode").and_then(|v| v.as_str()), Some("PAY_PER_REQUEST"));
}

#[tokio::test]
async fn test_malformed_config_fails_discovery() {
    let project = TestProject::new("shop").await.unwrap();
    project.write("api/api-gw.config.yml", "name: [unterminated\n").await.unwrap();

    let result = project.open("", test_collaborators()).await;

    assert!(result.is_err());
}
