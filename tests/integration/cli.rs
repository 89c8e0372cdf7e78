use predicates::prelude::*;

use crate::common::TestProject;

#[test]
fn test_new_creates_project_files() {
    let project = TestProject::empty().unwrap();

    project
        .dc()
        .args(["new", "shop"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Created project shop"));

    let settings = std::fs::read_to_string(project.root().join(".project.settings")).unwrap();
    assert!(settings.contains("shop"));
    assert!(project.root().join(".dcignore").exists());

    project.dc().args(["new", "shop"]).assert().failure().stderr(predicate::str::contains("already"));
}

#[test]
fn test_commands_outside_a_project_fail_with_suggestion() {
    let project = TestProject::empty().unwrap();

    project
        .dc()
        .arg("build")
        .assert()
        .failure()
        .stderr(predicate::str::contains("No dc project found"))
        .stderr(predicate::str::contains("dc new"));
}

#[tokio::test]
async fn test_build_with_nothing_to_build_succeeds() {
    let project = TestProject::new("shop").await.unwrap();
    project.mkdir("docs").await.unwrap();

    project
        .dc()
        .args(["--path", "docs", "build"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Nothing to build"));
}

#[tokio::test]
async fn test_add_creates_components_in_target_directory() {
    let project = TestProject::new("shop").await.unwrap();
    project.mkdir("services/orders").await.unwrap();

    project
        .dc()
        .args(["--path", "services/orders", "add", "cf-template", "orders"])
        .assert()
        .success()
        .stdout(predicate::str::contains("orders"));
    assert!(project.root().join("services/orders/orders.cf.yml").exists());

    project
        .dc()
        .args(["--path", "services/orders", "add", "package-file", "seed.json"])
        .assert()
        .success();
    assert!(project.root().join("services/orders/seed.include.json").exists());

    project
        .dc()
        .args(["-p", "services/orders", "add", "cf-template", "orders"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("already"));
}

#[tokio::test]
async fn test_package_writes_archives_to_output_directory() {
    let project = TestProject::new("shop").await.unwrap();
    project.write("app.package.yml", "name: shop\n").await.unwrap();
    project.write("readme.include.md", "# Shop\n").await.unwrap();

    project
        .dc()
        .args(["package", "--package-version", "1.0.0"])
        .assert()
        .success()
        .stdout(predicate::str::contains("shop-1.0.0.zip"));
    assert!(project.root().join(".packages/shop-1.0.0.zip").is_file());

    project.dc().args(["package", "--package-version", "1.0.1", "-o", "dist"]).assert().success();
    assert!(project.root().join("dist/shop-1.0.1.zip").is_file());
}

#[tokio::test]
async fn test_configure_with_nothing_required() {
    let project = TestProject::new("shop").await.unwrap();
    project.write("queues.cf.yml", "Resources: {}\n").await.unwrap();

    project
        .dc()
        .arg("configure")
        .assert()
        .success()
        .stdout(predicate::str::contains("Nothing left to configure"));
}
