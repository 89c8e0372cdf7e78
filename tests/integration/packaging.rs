use dc_cli::test_utils::test_collaborators;

use crate::common::{ORDERS_TEMPLATE, TestProject};

async fn storefront() -> TestProject {
    let project = TestProject::new("shop").await.unwrap();
    project.write("app.package.yml", "name: shop\n").await.unwrap();
    project
        .write("cloudformation-stack.config.yml", "name: local\nsettings:\n  services:\n    - serverless\n")
        .await
        .unwrap();
    project.write("services/orders/orders.cf.yml", ORDERS_TEMPLATE).await.unwrap();
    project.write("deploy.include.sh", "#!/bin/sh\necho deploy\n").await.unwrap();
    project.write("assets.include/img/logo.svg", "<svg/>").await.unwrap();
    project.write("assets.include/robots.txt", "User-agent: *\n").await.unwrap();
    project
}

#[tokio::test]
async fn test_application_collects_resources_of_its_subtree() {
    let project = storefront().await;
    let opened = project.open("", test_collaborators()).await.unwrap();

    let packages = opened.tree.package(opened.tree.root(), &opened.settings, "1.0.0").await.unwrap();

    assert_eq!(packages.len(), 1);
    assert_eq!(packages[0].package_name, "shop-1.0.0.zip");

    let mut names: Vec<&str> = packages[0].resources.iter().map(|r| r.name.as_str()).collect();
    names.sort_unstable();
    assert_eq!(
        names,
        vec!["assets.include/img/logo.svg", "assets.include/robots.txt", "deploy.include.sh", "template.yml"]
    );

    let template = packages[0].resources.iter().find(|r| r.name == "template.yml").unwrap();
    let template = String::from_utf8(template.content.clone()).unwrap();
    assert!(template.contains("OrdersTable"));
}

#[tokio::test]
async fn test_nested_applications_package_separately() {
    let project = storefront().await;
    project.write("services/orders/app.package.yml", "name: orders\n").await.unwrap();
    project.write("services/orders/seed.include.json", "[]").await.unwrap();
    let opened = project.open("", test_collaborators()).await.unwrap();

    let packages = opened.tree.package(opened.tree.root(), &opened.settings, "2.0.0").await.unwrap();

    let names: Vec<&str> = packages.iter().map(|p| p.package_name.as_str()).collect();
    assert_eq!(names, vec!["shop-2.0.0.zip", "orders-2.0.0.zip"]);

    let orders = &packages[1];
    assert_eq!(orders.resources.len(), 1);
    assert_eq!(orders.resources[0].name, "seed.include.json");
}

#[tokio::test]
async fn test_subtree_without_application_packages_nothing() {
    let project = storefront().await;
    let opened = project.open("services", test_collaborators()).await.unwrap();

    let packages = opened.tree.package(opened.tree.focus(), &opened.settings, "1.0.0").await.unwrap();

    assert!(packages.is_empty());
}

#[tokio::test]
async fn test_terraform_root_packages_modules_beneath_it() {
    let project = TestProject::new("shop").await.unwrap();
    project.write("infra/shop.main.tf", "terraform {}\n").await.unwrap();
    project.write("infra/network.tf", "resource \"aws_vpc\" \"main\" {}\n").await.unwrap();
    project.write("infra/scripts/seed.ps1", "Write-Host seed\n").await.unwrap();
    let opened = project.open("", test_collaborators()).await.unwrap();

    let packages = opened.tree.package(opened.tree.root(), &opened.settings, "3.1.0").await.unwrap();

    assert_eq!(packages.len(), 1);
    assert_eq!(packages[0].package_name, "shop.3.1.0.zip");
    let mut names: Vec<&str> = packages[0].resources.iter().map(|r| r.name.as_str()).collect();
    names.sort_unstable();
    assert_eq!(names, vec!["main.tf", "network.tf", "scripts/seed.ps1"]);
}
