//! Prints the DataSciencePipelinesApplication CRD as YAML
//!
//! `cargo run --bin crdgen > config/crd/dspa.yaml`

use kube::CustomResourceExt;
use pipelines_operator::crd::DataSciencePipelinesApplication;

fn main() -> anyhow::Result<()> {
    let crd = DataSciencePipelinesApplication::crd();
    print!("{}", serde_yaml::to_string(&crd)?);
    Ok(())
}
