//! Deployment tests.
//!
//! The offline tests run everywhere. The live ones create real resources and
//! need credentials, so they are ignored by default:
//!
//! ```sh
//! MOODLE_KEY_NAME=k1 cargo test -p moodle-stack-deploy -- --ignored
//! ```

use std::time::Duration;

use moodle_stack::{topology, StackConfig, OUTPUT_NAMES};
use moodle_stack_deploy::{
    check_template_size, AwsContext, Deployer, DeploymentState, StackOutputs, StackStatus,
};

#[test]
fn test_reference_template_fits_inline_limit() {
    let topology = topology::build(&StackConfig::with_inputs("k1", true)).unwrap();
    let template = topology.stack.synthesize().unwrap();
    let body = template.to_json_compact().unwrap();
    assert!(check_template_size(body.len()).is_ok());
}

#[test]
fn test_outputs_verified_against_topology_ids() {
    let expected = topology::Topology::output_ids();
    assert_eq!(expected.len(), OUTPUT_NAMES.len());

    let mut outputs = StackOutputs::default();
    for (id, name) in expected.iter().zip(OUTPUT_NAMES) {
        outputs.insert(id.as_str(), format!("value-of-{id}"), Some(name));
    }
    assert!(outputs.verify(expected.as_slice()).is_ok());

    let by_name = outputs.by_name();
    for name in OUTPUT_NAMES {
        assert!(by_name.contains_key(name), "missing {name}");
    }
}

#[test]
fn test_state_records_deploy_result() {
    let dir = tempfile::tempdir().unwrap();
    let mut state = DeploymentState::new("scalable-moodle-stack", "us-east-1", dir.path());
    state.set_status(StackStatus::UpdateComplete).unwrap();

    let loaded = DeploymentState::load(dir.path()).unwrap().unwrap();
    assert!(loaded.status.unwrap().is_success());
}

#[tokio::test]
#[ignore = "requires AWS credentials and creates billable resources"]
async fn test_deploy_reference_stack() {
    let key_name = std::env::var("MOODLE_KEY_NAME").unwrap_or_else(|_| "k1".to_string());
    let config = StackConfig::with_inputs(key_name, true);
    let topology = topology::build(&config).unwrap();
    let template = topology.stack.synthesize().unwrap();

    let aws = AwsContext::new(None).await;
    let deployer = Deployer::new(&aws, &config.stack_name);
    if deployer.submit(&template).await.unwrap().needs_wait() {
        let status = deployer
            .wait_for_completion(Duration::from_secs(90 * 60))
            .await
            .unwrap();
        assert!(status.is_success());
    }

    let outputs = deployer.outputs().await.unwrap();
    outputs.verify(topology::Topology::output_ids().as_slice()).unwrap();
}

#[tokio::test]
#[ignore = "requires AWS credentials"]
async fn test_missing_stack_has_no_status() {
    let aws = AwsContext::new(None).await;
    let deployer = Deployer::new(&aws, "moodle-stack-does-not-exist");
    assert!(deployer.status().await.unwrap().is_none());
}
