//! Registry setup scenarios, including every configuration error that must
//! stop the scheduler at startup.

mod common;

use common::{step_ref, KeyedStep};
use dynamic_scheduler::{
    DomainError, KeyConfig, RegistryState, StepReference, WorkflowDefinition, WorkflowRegistry,
};
use std::collections::BTreeSet;

fn wave(names: &[&str]) -> BTreeSet<StepReference> {
    names.iter().map(|n| step_ref(n)).collect()
}

fn setup_error(name: &str, definition: WorkflowDefinition) -> DomainError {
    let mut registry = WorkflowRegistry::new();
    registry.register_workflow(name, definition).unwrap();
    registry.setup().unwrap_err()
}

#[test]
fn test_diamond_sequence() {
    let definition = WorkflowDefinition::new(["from_initial_context_1"])
        .with_step(KeyedStep::new("SA"), vec![])
        .with_step(KeyedStep::new("SB"), vec![step_ref("SA")])
        .with_step(KeyedStep::new("SC"), vec![step_ref("SA")])
        .with_step(
            KeyedStep::new("SD"),
            vec![step_ref("SB"), step_ref("SC"), step_ref("SA")],
        );

    let mut registry = WorkflowRegistry::new();
    registry.register_workflow("diamond", definition).unwrap();
    registry.setup().unwrap();

    let sequence = registry.get_workflow_steps_sequence("diamond").unwrap();
    assert_eq!(
        sequence,
        vec![wave(&["SA"]), wave(&["SB", "SC"]), wave(&["SD"])]
    );
    for name in ["SA", "SB", "SC", "SD"] {
        let step = registry.get_base_step(&step_ref(name)).unwrap();
        assert_eq!(step.unique_reference(), step_ref(name));
    }
}

#[test]
fn test_empty_workflow_has_empty_sequence() {
    let mut registry = WorkflowRegistry::new();
    registry
        .register_workflow("empty", WorkflowDefinition::default())
        .unwrap();
    registry.setup().unwrap();

    assert!(registry
        .get_workflow_steps_sequence("empty")
        .unwrap()
        .is_empty());
}

#[test]
fn test_data_flow_through_waves_is_valid() {
    // APPLY: user_id -> SA -> node_id -> SB -> container_id
    // REVERT runs SB before SA, so SA may consume what SB's revert produced.
    let definition = WorkflowDefinition::new(["user_id"])
        .with_step(
            KeyedStep::new("SA")
                .apply_in(&["user_id"])
                .apply_out(&["node_id"])
                .revert_in(&["released_container"]),
            vec![],
        )
        .with_step(
            KeyedStep::new("SB")
                .apply_in(&["node_id", "user_id"])
                .apply_out(&["container_id"])
                .revert_out(&["released_container"]),
            vec![step_ref("SA")],
        );

    let mut registry = WorkflowRegistry::new();
    registry.register_workflow("start", definition).unwrap();
    registry.setup().unwrap();
    assert_eq!(registry.state(), RegistryState::Ready);
}

#[test]
fn test_cycle_is_not_a_dag() {
    let definition = WorkflowDefinition::default()
        .with_step(KeyedStep::new("SA"), vec![step_ref("SC")])
        .with_step(KeyedStep::new("SB"), vec![step_ref("SA")])
        .with_step(KeyedStep::new("SC"), vec![step_ref("SB")]);

    let err = setup_error("cyclic", definition);
    assert!(matches!(err, DomainError::NotADag { .. }), "{err}");
    assert!(err.to_string().contains("not a DAG"));
}

#[test]
fn test_unknown_dependency() {
    let definition =
        WorkflowDefinition::default().with_step(KeyedStep::new("SA"), vec![step_ref("ghost")]);

    let err = setup_error("dangling", definition);
    assert!(matches!(err, DomainError::UnknownDependency { .. }), "{err}");
}

#[test]
fn test_optional_key_in_initial_context() {
    let definition = WorkflowDefinition::new([KeyConfig::optional("maybe_user")])
        .with_step(KeyedStep::new("SA"), vec![]);

    let err = setup_error("optional_initial", definition);
    assert!(err
        .to_string()
        .contains("Initial context cannot have optional keys."));
}

#[test]
fn test_optional_initial_key_reported_before_cycle() {
    let definition = WorkflowDefinition::new([KeyConfig::optional("maybe_user")])
        .with_step(KeyedStep::new("SA"), vec![step_ref("SB")])
        .with_step(KeyedStep::new("SB"), vec![step_ref("SA")]);

    let err = setup_error("cyclic_optional", definition);
    assert!(
        matches!(err, DomainError::OptionalKeyInInitialContext { .. }),
        "{err}"
    );
}

#[test]
fn test_missing_apply_input() {
    let definition = WorkflowDefinition::new(["user_id"])
        .with_step(KeyedStep::new("SA").apply_in(&["project_id"]), vec![]);

    let message = setup_error("missing_apply", definition).to_string();
    assert!(message.contains("project_id"), "{message}");
    assert!(message.contains("APPLY sequence_context"), "{message}");
}

#[test]
fn test_missing_revert_input() {
    // The initial context does not feed the revert direction.
    let definition = WorkflowDefinition::new(["user_id"])
        .with_step(KeyedStep::new("SA").revert_in(&["user_id"]), vec![]);

    let message = setup_error("missing_revert", definition).to_string();
    assert!(message.contains("user_id"), "{message}");
    assert!(message.contains("REVERT sequence_context"), "{message}");
}

#[test]
fn test_output_of_same_wave_sibling_is_not_visible() {
    let definition = WorkflowDefinition::default()
        .with_step(KeyedStep::new("SA").apply_out(&["node_id"]), vec![])
        .with_step(KeyedStep::new("SB").apply_in(&["node_id"]), vec![]);

    let message = setup_error("siblings", definition).to_string();
    assert!(message.contains("node_id"), "{message}");
    assert!(message.contains("APPLY sequence_context"), "{message}");
}

#[test]
fn test_duplicate_parallel_apply_output() {
    let definition = WorkflowDefinition::default()
        .with_step(KeyedStep::new("SA").apply_out(&["port"]), vec![])
        .with_step(KeyedStep::new("SB").apply_out(&["port"]), vec![]);

    let err = setup_error("dup_apply", definition);
    let message = err.to_string();
    assert!(matches!(err, DomainError::DuplicateParallelOutput { .. }));
    assert!(message.contains("port"), "{message}");
    assert!(message.contains("already added by a step in APPLY"), "{message}");
}

#[test]
fn test_duplicate_parallel_revert_output() {
    let definition = WorkflowDefinition::default()
        .with_step(KeyedStep::new("SA").revert_out(&["freed"]), vec![])
        .with_step(KeyedStep::new("SB").revert_out(&["freed"]), vec![]);

    let message = setup_error("dup_revert", definition).to_string();
    assert!(message.contains("freed"), "{message}");
    assert!(message.contains("already added by a step in REVERT"), "{message}");
}

#[test]
fn test_same_output_in_different_waves_is_allowed() {
    let definition = WorkflowDefinition::default()
        .with_step(KeyedStep::new("SA").apply_out(&["state"]), vec![])
        .with_step(KeyedStep::new("SB").apply_out(&["state"]), vec![step_ref("SA")]);

    let mut registry = WorkflowRegistry::new();
    registry.register_workflow("overwrite", definition).unwrap();
    registry.setup().unwrap();
}

#[test]
fn test_step_shared_across_workflows() {
    let mut registry = WorkflowRegistry::new();
    registry
        .register_workflow(
            "start",
            WorkflowDefinition::default().with_step(KeyedStep::new("SA"), vec![]),
        )
        .unwrap();
    registry
        .register_workflow(
            "stop",
            WorkflowDefinition::default().with_step(KeyedStep::new("SA"), vec![]),
        )
        .unwrap();

    let err = registry.setup().unwrap_err();
    assert_eq!(err.to_string(), "SA already registered");
    assert!(!registry.is_ready());
}

#[test]
fn test_duplicate_workflow_name() {
    let mut registry = WorkflowRegistry::new();
    registry
        .register_workflow("start", WorkflowDefinition::default())
        .unwrap();
    let err = registry
        .register_workflow("start", WorkflowDefinition::default())
        .unwrap_err();
    assert!(matches!(err, DomainError::WorkflowAlreadyRegistered(_)));
}

#[test]
fn test_shutdown_allows_new_registrations() {
    let mut registry = WorkflowRegistry::new();
    registry
        .register_workflow(
            "start",
            WorkflowDefinition::default().with_step(KeyedStep::new("SA"), vec![]),
        )
        .unwrap();
    registry.setup().unwrap();
    registry.shutdown();

    assert!(matches!(
        registry.get_workflow_steps_sequence("start"),
        Err(DomainError::RegistryNotReady)
    ));

    registry
        .register_workflow(
            "restart",
            WorkflowDefinition::default().with_step(KeyedStep::new("SA"), vec![]),
        )
        .unwrap();
    registry.setup().unwrap();
    assert_eq!(registry.workflow_names(), vec!["restart"]);
    assert!(matches!(
        registry.get_workflow_steps_sequence("start"),
        Err(DomainError::WorkflowNotFound(_))
    ));
}
