//! 예시 프로브 파일 통합 테스트

use dofinder_core::types::ProbeKind;
use dofinder_registry::{FileProbeCatalog, ProbeCatalog};

const EXAMPLE: &str = include_str!("../../../probes.toml.example");

#[tokio::test]
async fn example_probe_file_loads() {
    let catalog = FileProbeCatalog::parse(EXAMPLE).expect("example probes should parse");

    let system = catalog.system_probes().await.expect("system probes");
    assert!(!system.is_empty());
    assert!(system.iter().all(|p| p.kind == ProbeKind::System));

    let software = catalog.software_probes().await.expect("software probes");
    assert!(software.iter().any(|p| p.name == "python"));
}

#[tokio::test]
async fn example_patterns_extract_versions() {
    let catalog = FileProbeCatalog::parse(EXAMPLE).expect("example probes should parse");
    let software = catalog.software_probes().await.expect("software probes");
    let python = software
        .iter()
        .find(|p| p.name == "python")
        .expect("python probe present");

    let regex = python.compile().expect("pattern compiles");
    let found = regex.find("Python 3.4.3\n").map(|m| m.as_str());
    assert_eq!(found, Some("3.4.3"));
}

#[tokio::test]
async fn example_os_release_probe_matches_alpine() {
    let catalog = FileProbeCatalog::parse(EXAMPLE).expect("example probes should parse");
    let system = catalog.system_probes().await.expect("system probes");
    let regex = system[0].compile().expect("pattern compiles");
    let text = "NAME=\"Alpine Linux\"\nID=alpine\nVERSION_ID=3.12.0\n";
    assert_eq!(regex.find(text).map(|m| m.as_str()), Some("Alpine"));
}
