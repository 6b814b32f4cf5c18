// Copyright (c) Contributors to the conc project.
// SPDX-License-Identifier: Apache-2.0

use std::collections::BTreeSet;

use rstest::rstest;

use crate::foundation::arch::Arch;
use crate::foundation::{pkg_name, variant_map};
use crate::{AbstractSpec, ConcreteEdge, ConcreteNode, ConcreteSpec, EdgeType, NodeAttrs};

fn attrs(name: &str, version: &str) -> NodeAttrs {
    NodeAttrs {
        name: name.parse().unwrap(),
        version: version.parse().unwrap(),
        compiler: "gcc@12.2.0".parse().unwrap(),
        arch: Arch::new("linux", "ubuntu22.04", "x86_64"),
        variants: variant_map! {"shared" => true},
    }
}

fn edge_to(node: &ConcreteNode) -> ConcreteEdge {
    ConcreteEdge {
        name: node.name().to_owned(),
        hash: *node.hash(),
        types: BTreeSet::from([EdgeType::Build, EdgeType::Link]),
        virtuals: BTreeSet::new(),
    }
}

/// hdf5 -> (zlib, mpich -> zlib)
fn diamond() -> ConcreteSpec {
    let mut builder = ConcreteSpec::builder();
    let zlib = builder
        .insert(ConcreteNode::new(attrs("zlib", "1.3"), Vec::new()).unwrap())
        .unwrap();
    let mpich = builder
        .insert(ConcreteNode::new(attrs("mpich", "4.1"), vec![edge_to(&zlib)]).unwrap())
        .unwrap();
    let hdf5 = builder
        .insert(
            ConcreteNode::new(attrs("hdf5", "1.14"), vec![edge_to(&mpich), edge_to(&zlib)])
                .unwrap(),
        )
        .unwrap();
    builder.add_root(*hdf5.hash()).unwrap();
    builder.build()
}

#[rstest]
fn test_identical_nodes_are_shared() {
    let mut builder = ConcreteSpec::builder();
    let a = builder
        .insert(ConcreteNode::new(attrs("zlib", "1.3"), Vec::new()).unwrap())
        .unwrap();
    let b = builder
        .insert(ConcreteNode::new(attrs("zlib", "1.3"), Vec::new()).unwrap())
        .unwrap();
    assert!(std::sync::Arc::ptr_eq(&a, &b));
    assert_eq!(builder.build().len(), 1);
}

#[rstest]
fn test_external_and_built_nodes_do_not_share() {
    let mut builder = ConcreteSpec::builder();
    builder
        .insert(
            ConcreteNode::new(attrs("zlib", "1.3"), Vec::new())
                .unwrap()
                .with_external_prefix("/usr"),
        )
        .unwrap();
    let err = builder
        .insert(ConcreteNode::new(attrs("zlib", "1.3"), Vec::new()).unwrap())
        .expect_err("an external node cannot stand in for a build");
    assert!(err.to_string().contains("external at /usr and built"), "{err}");
    let zlib = builder.build().find(pkg_name!("zlib"))[0].clone();
    assert_eq!(zlib.external_prefix(), Some(std::path::Path::new("/usr")));
}

#[rstest]
fn test_insert_requires_dependencies_first() {
    let zlib = ConcreteNode::new(attrs("zlib", "1.3"), Vec::new()).unwrap();
    let mut builder = ConcreteSpec::builder();
    builder
        .insert(ConcreteNode::new(attrs("mpich", "4.1"), vec![edge_to(&zlib)]).unwrap())
        .expect_err("dependency has not been added");
    builder
        .add_root(*zlib.hash())
        .expect_err("root has not been added");
}

#[rstest]
fn test_graph_queries() {
    let spec = diamond();
    assert_eq!(spec.len(), 3);
    let root = spec.root().unwrap();
    assert_eq!(root.name().as_str(), "hdf5");

    let order: Vec<_> = spec.nodes().map(|n| n.name().to_string()).collect();
    assert_eq!(order, vec!["zlib", "mpich", "hdf5"]);

    let zlib = spec.find(pkg_name!("zlib"));
    assert_eq!(zlib.len(), 1);
    let prefix = zlib[0].hash().short();
    assert_eq!(
        spec.find_by_hash_prefix(&prefix).map(|n| n.hash()),
        Some(zlib[0].hash())
    );

    let deps: Vec<_> = spec
        .dependencies_of(root)
        .map(|(_, dep)| dep.name().to_string())
        .collect();
    assert_eq!(deps.len(), 2);
    assert!(deps.contains(&"mpich".to_string()));
}

#[rstest]
fn test_to_abstract_pins_everything() {
    let spec = diamond();
    let root = spec.roots()[0];
    let pinned = spec.to_abstract(&root).unwrap();
    assert_eq!(pinned.name.as_deref().map(|n| n.as_str()), Some("hdf5"));
    let names: Vec<_> = pinned
        .dependencies
        .iter()
        .filter_map(|d| d.name.as_ref().map(ToString::to_string))
        .collect();
    assert_eq!(names, vec!["mpich", "zlib"]);
    assert!(pinned.satisfied_by_spec(&spec).is_ok());

    let reparsed: AbstractSpec = pinned.to_string().parse().unwrap();
    assert_eq!(reparsed, pinned);
}

#[rstest]
fn test_to_abstract_leaves_split_packages_unpinned() {
    let mut builder = ConcreteSpec::builder();
    let old = builder
        .insert(ConcreteNode::new(attrs("tool", "1.0"), Vec::new()).unwrap())
        .unwrap();
    let new = builder
        .insert(ConcreteNode::new(attrs("tool", "2.0"), Vec::new()).unwrap())
        .unwrap();
    let front = builder
        .insert(ConcreteNode::new(attrs("front", "1.0"), vec![edge_to(&old)]).unwrap())
        .unwrap();
    let back = builder
        .insert(ConcreteNode::new(attrs("back", "1.0"), vec![edge_to(&new)]).unwrap())
        .unwrap();
    let suite = builder
        .insert(
            ConcreteNode::new(attrs("suite", "1.0"), vec![edge_to(&front), edge_to(&back)])
                .unwrap(),
        )
        .unwrap();
    builder.add_root(*suite.hash()).unwrap();
    let spec = builder.build();

    let pinned = spec.to_abstract(suite.hash()).unwrap();
    let names: Vec<_> = pinned
        .dependencies
        .iter()
        .filter_map(|d| d.name.as_ref().map(ToString::to_string))
        .collect();
    assert_eq!(names, vec!["back", "front"]);
}

#[rstest]
fn test_node_satisfies() {
    let spec = diamond();
    let zlib = spec.find(pkg_name!("zlib"))[0].clone();
    let wanted = AbstractSpec::parse_anonymous("@1.3 +shared").unwrap();
    assert!(zlib.satisfies(&wanted.constraints).is_ok());
    let wanted = AbstractSpec::parse_anonymous("@1.2").unwrap();
    assert!(!zlib.satisfies(&wanted.constraints).is_ok());
}
