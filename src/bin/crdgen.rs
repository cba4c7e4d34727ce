//! CRD YAML Generator
//!
//! This binary generates Kubernetes CRD manifests for the DbCluster,
//! DbClusterBackup and DbClusterRestore resources.
//!
//! Usage: cargo run --bin crdgen > deploy/crds/all.yaml

use db_restore_operator::crd::generate_crds;

fn main() {
    for crd in generate_crds() {
        println!("---");
        print!("{}", crd);
    }
}
