use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{
    Direction, KeyConfig, StepReference, StepsSequence, WorkflowDefinition,
};
use crate::domain::ports::Step;

/// Static data-flow checks on a sequenced workflow.
///
/// Replays the waves in both directions over a set of key names:
/// - APPLY starts from the initial context and walks the waves forward
/// - REVERT starts empty and walks the waves backward
///
/// Every required input of a step must already be in the context when its
/// wave starts. Outputs of a wave become visible to the following waves only,
/// and two steps of the same wave may not provide the same key.
#[derive(Debug, Clone, Default)]
pub struct WorkflowValidator;

impl WorkflowValidator {
    pub fn new() -> Self {
        Self
    }

    /// Reject optional keys in the initial context. Needs no sequence, so
    /// it can run before sequencing.
    pub fn check_initial_context(
        &self,
        workflow: &str,
        definition: &WorkflowDefinition,
    ) -> DomainResult<()> {
        let mut initial_keys: Vec<&KeyConfig> = definition.initial_context.iter().collect();
        initial_keys.sort_by(|a, b| a.name.cmp(&b.name));
        match initial_keys.into_iter().find(|key| key.optional) {
            Some(key) => Err(DomainError::OptionalKeyInInitialContext {
                workflow: workflow.to_string(),
                key: key.name.clone(),
            }),
            None => Ok(()),
        }
    }

    /// Replay APPLY and REVERT over `sequence`, checking required inputs and
    /// duplicate outputs within a wave.
    pub fn check_data_flow(
        &self,
        workflow: &str,
        definition: &WorkflowDefinition,
        sequence: &StepsSequence,
    ) -> DomainResult<()> {
        let steps: HashMap<StepReference, &Arc<dyn Step>> = definition
            .steps
            .iter()
            .map(|entry| (entry.reference(), &entry.step))
            .collect();

        let initial_context: HashSet<String> = definition
            .initial_context
            .iter()
            .map(|key| key.name.clone())
            .collect();

        self.check_direction(
            workflow,
            Direction::Apply,
            sequence.iter(),
            &steps,
            initial_context,
        )?;
        self.check_direction(
            workflow,
            Direction::Revert,
            sequence.iter().rev(),
            &steps,
            HashSet::new(),
        )
    }

    fn check_direction<'a>(
        &self,
        workflow: &str,
        direction: Direction,
        waves: impl Iterator<Item = &'a BTreeSet<StepReference>>,
        steps: &HashMap<StepReference, &Arc<dyn Step>>,
        mut context: HashSet<String>,
    ) -> DomainResult<()> {
        for wave in waves {
            let mut wave_outputs: HashSet<String> = HashSet::new();

            for reference in wave {
                let step = steps
                    .get(reference)
                    .ok_or_else(|| DomainError::StepNotFound(reference.clone()))?;

                let (inputs, outputs) = match direction {
                    Direction::Apply => (step.apply_requests_inputs(), step.apply_provides_outputs()),
                    Direction::Revert => {
                        (step.revert_requests_inputs(), step.revert_provides_outputs())
                    }
                };

                let mut required: Vec<String> = inputs
                    .into_iter()
                    .filter(KeyConfig::is_required)
                    .map(|key| key.name)
                    .collect();
                required.sort();
                if let Some(key) = required.into_iter().find(|key| !context.contains(key)) {
                    return Err(DomainError::MissingRequiredKey {
                        workflow: workflow.to_string(),
                        direction,
                        step: reference.clone(),
                        key,
                    });
                }

                let mut provided: Vec<String> = outputs.into_iter().map(|key| key.name).collect();
                provided.sort();
                for key in provided {
                    if wave_outputs.contains(&key) {
                        return Err(DomainError::DuplicateParallelOutput {
                            workflow: workflow.to_string(),
                            direction,
                            step: reference.clone(),
                            key,
                        });
                    }
                    wave_outputs.insert(key);
                }
            }

            context.extend(wave_outputs);
        }
        Ok(())
    }
}
