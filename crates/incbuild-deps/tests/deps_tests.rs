use incbuild_deps::{
    ConfigurationContainer, ConfigurationRef, Dependency, DependencyConstraint, DependencyConstraintHandler,
    DependencyError,
};

fn project() -> ConfigurationContainer {
    let mut container = ConfigurationContainer::new(":app");
    container.create("api");
    container.create("implementation");
    container.create("runtimeClasspath");
    container
}

#[test]
fn test_configuration_from_other_project_is_rejected() {
    let mut container = project();
    let before = container.clone();

    let foreign = ConfigurationRef {
        project: ":lib".into(),
        name: "api".into(),
    };
    let mut handler = DependencyConstraintHandler::new(&mut container);
    let err = handler.add("implementation", foreign).unwrap_err();

    assert_eq!(
        err.to_string(),
        "Currently you can only declare dependencies on configurations from the same project."
    );
    assert!(matches!(err, DependencyError::InvalidConfigurationUsage { .. }));
    assert_eq!(container, before);
}

#[test]
fn test_missing_configuration_in_same_project_is_rejected() {
    let mut container = project();
    let before = container.clone();
    let missing = container.reference("testImplementation");

    let mut handler = DependencyConstraintHandler::new(&mut container);
    assert!(matches!(
        handler.add("implementation", missing),
        Err(DependencyError::InvalidConfigurationUsage { .. })
    ));
    assert_eq!(container, before);
}

#[test]
fn test_configuration_notation_extends() {
    let mut container = project();
    let api = container.reference("api");
    let implementation = container.reference("implementation");

    let mut handler = DependencyConstraintHandler::new(&mut container);
    assert_eq!(handler.add("implementation", api), Ok(None));
    assert_eq!(handler.add("runtimeClasspath", implementation), Ok(None));
    handler.add("api", "org.zlib:zlib:1.3").unwrap();
    handler.add("implementation", "org.lz4:lz4:1.9").unwrap();

    let visible: Vec<String> = container
        .all_dependency_constraints("runtimeClasspath")
        .iter()
        .map(|c| c.to_string())
        .collect();
    assert_eq!(visible, ["org.lz4:lz4:1.9", "org.zlib:zlib:1.3"]);
}

#[test]
fn test_stored_copy_is_content_equal() {
    let mut container = project();
    let mut handler = DependencyConstraintHandler::new(&mut container);
    let returned = handler.add("api", "org.zlib:zlib:1.3").unwrap().unwrap();

    let stored = &container.get("api").unwrap().dependency_constraints()[0];
    assert!(!std::ptr::eq(stored, &returned));
    assert!(stored.content_equals(&Dependency::Constraint(returned.copy())));
}

#[test]
fn test_constraint_serde() {
    let constraint: DependencyConstraint = "org.zlib:zlib:1.3".parse().unwrap();
    let json = serde_json::to_string(&constraint).unwrap();
    let back: DependencyConstraint = serde_json::from_str(&json).unwrap();
    assert_eq!(back, constraint);
}
