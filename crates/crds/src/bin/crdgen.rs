//! Prints the FleetOS CRD manifests as a multi-document YAML stream.

use crds::{DesiredState, MachineStatus};
use kube::CustomResourceExt;

fn main() -> Result<(), serde_yaml::Error> {
    let manifests = [DesiredState::crd(), MachineStatus::crd()];
    for crd in manifests {
        println!("---");
        print!("{}", serde_yaml::to_string(&crd)?);
    }
    Ok(())
}
