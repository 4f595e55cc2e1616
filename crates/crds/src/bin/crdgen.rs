//! Prints the CustomResourceDefinition manifests as YAML.
//!
//! `cargo run -p crds --bin crdgen > deploy/crds.yaml`

use crds::Nginx;
use kube::CustomResourceExt;

fn main() -> anyhow::Result<()> {
    print!("{}", serde_yaml::to_string(&Nginx::crd())?);
    Ok(())
}
