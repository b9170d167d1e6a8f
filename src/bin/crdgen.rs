//! # CRD Generator
//!
//! Prints the AppInstance and AppTemplate CustomResourceDefinitions as YAML.
//!
//! ## Usage
//!
//! ```bash
//! # Generate CRD YAML
//! cargo run --bin crdgen > config/crd/crds.yaml
//!
//! # Generate and apply directly
//! cargo run --bin crdgen | kubectl apply -f -
//! ```

use anyhow::Result;
use app_bundle_controller::crd::{AppInstance, AppTemplate};
use kube::CustomResourceExt;

fn main() -> Result<()> {
    let instance = serde_yaml::to_string(&AppInstance::crd())?;
    let template = serde_yaml::to_string(&AppTemplate::crd())?;
    print!("{instance}---\n{template}");
    Ok(())
}
