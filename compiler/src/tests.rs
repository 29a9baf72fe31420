use std::{future::Future, pin::Pin, sync::Arc};

use ensemble_manifest::Manifest;
use ensemble_registry::{Backend, CapabilityValue, MemoryBackend, Registry};
use ensemble_scenario::{CapabilityRef, ProducerPolicy, ResourceRef, Value};
use serde_json::json;

use crate::{
    CompileOptions, CompileOutput, Compiler, Error, resolve_node_capabilities,
    reporter::{DotReporter, JsonReporter, PlanReporter, Reporter, TextReporter},
};

const TYPES: &str = r#"{
    db: {
      parameters: { password: {}, user: { default: "admin" } },
      produces: [
        { capability: "Sql", title: "$name", attributes: { user: "$user", host: "${name}.db" } },
      ],
    },
    web: {
      parameters: { port: { default: 80 } },
      consumes: [{ capability: "Sql", parameter: "db" }],
      produces: [{ capability: "Http", title: "$name", attributes: { port: "$port" } }],
    },
    lb: {
      consumes: [{ capability: "Http", parameter: "backends" }],
    },
    svc: {
      produces: [{ capability: "Port", title: "$name" }],
      consumes: [{ capability: "Port", parameter: "peer" }],
    },
  }"#;

const FOO: &str = r#"{
    foo: {
      parameters: { dbuser: { default: "admin" } },
      components: [
        { component: "db", title: "one", args: { password: "s3cret", user: "$dbuser" } },
        { component: "web", title: "two", args: { db: "Sql[one]" } },
      ],
    },
  }"#;

const FOO_INSTANCE: &str = r#"[
    { application: "foo", title: "prod",
      args: { nodes: { "Node[n1]": "Db[one]", "Node[n2]": ["Web[two]"] } } },
  ]"#;

fn doc(applications: &str, instances: &str) -> String {
    format!(
        "{{ manifest_version: \"0.1.0\", component_types: {TYPES}, applications: \
         {applications}, instances: {instances} }}"
    )
}

fn manifest(source: &str) -> Manifest {
    Manifest::parse_named("test.json5", source).unwrap()
}

fn compile(applications: &str, instances: &str) -> Result<CompileOutput, Error> {
    Compiler::default().compile(&[manifest(&doc(applications, instances))])
}

fn foo() -> CompileOutput {
    compile(FOO, FOO_INSTANCE).unwrap()
}

#[test]
fn producers_are_ordered_before_consumers() {
    let output = foo();
    assert_eq!(output.order, ["n1", "n2"]);
    assert_eq!(output.environment, "production");

    let instance = &output.instances[0];
    assert_eq!(instance.reference().to_string(), "Foo[prod]");
    assert_eq!(instance.parameter("dbuser"), Some(&Value::from("admin")));

    let db = instance.component(&ResourceRef::new("Db", "one")).unwrap();
    assert_eq!(db.produces(), [CapabilityRef::new("Sql", "one")]);
    let web = instance.component(&ResourceRef::new("Web", "two")).unwrap();
    assert_eq!(web.consumes(), [CapabilityRef::new("Sql", "one")]);
    assert_eq!(web.produces(), [CapabilityRef::new("Http", "two")]);
}

#[test]
fn produced_capabilities_carry_evaluated_attributes() {
    let output = foo();
    let capabilities = output.instances[0].capabilities();
    assert_eq!(capabilities.len(), 2);

    let sql = &capabilities[0];
    assert_eq!(sql.capability, CapabilityRef::new("Sql", "one"));
    assert_eq!(sql.component, ResourceRef::new("Db", "one"));
    assert_eq!(sql.attributes["user"], Value::from("admin"));
    assert_eq!(sql.attributes["host"], Value::from("one.db"));

    let http = &capabilities[1];
    assert_eq!(http.attributes["port"], Value::from(80_i64));
}

#[test]
fn supplied_parameters_override_defaults() {
    let instances = r#"[
      { application: "foo", title: "prod",
        args: { dbuser: "root", nodes: { "Node[n1]": ["Db[one]", "Web[two]"] } } },
    ]"#;
    let output = compile(FOO, instances).unwrap();
    let sql = &output.instances[0].capabilities()[0];
    assert_eq!(sql.attributes["user"], Value::from("root"));

    // Both components on one node: no edge, nothing blocks ordering.
    assert_eq!(output.order, ["n1"]);
    assert!(output.graph.dependencies("n1").unwrap().is_empty());
}

#[test]
fn each_blocks_expand_per_element() {
    let applications = r#"{
      farm: {
        parameters: { names: { default: ["a", "b"] } },
        components: [
          { component: "db", title: "main", args: { password: "x" } },
          { each: "$names", as: "n", body: [
            { component: "web", title: "${n}", args: { db: "Sql[main]" } },
          ] },
          { component: "lb", title: "front", args: { backends: ["Http[a]", "Http[b]"] } },
        ],
      },
    }"#;
    let instances = r#"[
      { application: "farm", title: "f",
        args: { nodes: {
          "Node[db]": "Db[main]",
          "Node[wa]": "Web[a]",
          "Node[wb]": "Web[b]",
          "Node[edge]": "Lb[front]",
        } } },
    ]"#;

    let output = compile(applications, instances).unwrap();
    assert_eq!(output.order, ["db", "wa", "wb", "edge"]);

    let lb = output.instances[0]
        .component(&ResourceRef::new("Lb", "front"))
        .unwrap();
    assert_eq!(
        lb.consumes(),
        [CapabilityRef::new("Http", "a"), CapabilityRef::new("Http", "b")]
    );
}

#[test]
fn each_bindings_do_not_leak_out_of_the_block() {
    let applications = r#"{
      leak: {
        components: [
          { each: ["one"], as: "t", body: [
            { component: "db", title: "$t", args: { password: "x" } },
          ] },
          { component: "db", title: "$t", args: { password: "x" } },
        ],
      },
    }"#;
    let instances = r#"[
      { application: "leak", title: "l", args: { nodes: { "Node[n]": "Db[one]" } } },
    ]"#;

    let err = compile(applications, instances).unwrap_err();
    assert!(matches!(err, Error::UndefinedVariable { ref name } if name == "t"), "{err}");
}

#[test]
fn independent_instances_are_not_ordered_against_each_other() {
    let instances = r#"[
      { application: "foo", title: "a",
        args: { nodes: { "Node[a1]": "Db[one]", "Node[a2]": "Web[two]" } } },
      { application: "foo", title: "b",
        args: { nodes: { "Node[b1]": "Db[one]", "Node[b2]": "Web[two]" } } },
    ]"#;
    let output = compile(FOO, instances).unwrap();
    assert_eq!(output.instances.len(), 2);
    assert_eq!(output.order, ["a1", "b1", "a2", "b2"]);

    let pos = |n: &str| output.order.iter().position(|o| o == n).unwrap();
    assert!(pos("a1") < pos("a2"));
    assert!(pos("b1") < pos("b2"));
    assert!(output.graph.dependencies("a2").unwrap().contains("a1"));
    assert!(!output.graph.dependencies("b2").unwrap().contains("a1"));
}

#[test]
fn definitions_from_several_manifests_are_combined() {
    let types = manifest(&doc("{}", "[]"));
    let apps = manifest(&format!(
        "{{ manifest_version: \"0.1.0\", applications: {FOO}, instances: {FOO_INSTANCE} }}"
    ));
    let output = Compiler::default().compile(&[types, apps]).unwrap();
    assert_eq!(output.order, ["n1", "n2"]);
}

#[test]
fn definitions_may_not_repeat_across_manifests() {
    let first = manifest(&doc("{}", "[]"));
    let second = manifest(&doc("{}", "[]"));
    let err = Compiler::default().compile(&[first, second]).unwrap_err();
    assert!(matches!(
        err,
        Error::DuplicateDefinition {
            kind: "component type",
            ..
        }
    ));
}

#[test]
fn undefined_application_is_reported() {
    let instances = r#"[{ application: "nope", title: "x", args: {} }]"#;
    let err = compile(FOO, instances).unwrap_err();
    assert!(matches!(err, Error::UndefinedApplication { ref application } if application == "nope"));
}

#[test]
fn multiple_titles_are_unsupported() {
    let instances = r#"[
      { application: "foo", title: ["a", "b"], args: { nodes: { "Node[n1]": "Db[one]" } } },
    ]"#;
    let err = compile(FOO, instances).unwrap_err();
    assert!(matches!(err, Error::UnsupportedMultiTitle { count: 2, .. }));
}

#[test]
fn duplicate_arguments_are_rejected() {
    let applications = r#"{
      foo: {
        components: [
          { component: "db", title: "one", args: { password: "a", password: "b" } },
        ],
      },
    }"#;
    let instances = r#"[
      { application: "foo", title: "prod", args: { nodes: { "Node[n1]": "Db[one]" } } },
    ]"#;
    let err = compile(applications, instances).unwrap_err();
    assert!(
        matches!(err, Error::DuplicateParameter { ref resource, ref parameter }
            if resource == "Db[one]" && parameter == "password"),
        "{err}"
    );
}

#[test]
fn unknown_and_missing_parameters_are_rejected() {
    let instances = r#"[
      { application: "foo", title: "prod",
        args: { colour: "red", nodes: { "Node[n1]": "Db[one]" } } },
    ]"#;
    let err = compile(FOO, instances).unwrap_err();
    assert!(matches!(err, Error::UnknownParameter { ref parameter, .. } if parameter == "colour"));

    let applications = r#"{
      foo: {
        components: [{ component: "db", title: "one", args: {} }],
      },
    }"#;
    let instances = r#"[
      { application: "foo", title: "prod", args: { nodes: { "Node[n1]": "Db[one]" } } },
    ]"#;
    let err = compile(applications, instances).unwrap_err();
    assert!(
        matches!(err, Error::MissingParameter { ref resource, ref parameter }
            if resource == "Db[one]" && parameter == "password"),
        "{err}"
    );
}

#[test]
fn missing_nodes_argument_is_reported() {
    let instances = r#"[{ application: "foo", title: "prod", args: {} }]"#;
    let err = compile(FOO, instances).unwrap_err();
    assert!(matches!(
        err,
        Error::Scenario(ensemble_scenario::Error::MissingNodeMapping { .. })
    ));

    // Checked before any other argument.
    let instances = r#"[{ application: "foo", title: "prod", args: { colour: "red" } }]"#;
    let err = compile(FOO, instances).unwrap_err();
    assert!(
        matches!(
            err,
            Error::Scenario(ensemble_scenario::Error::MissingNodeMapping { .. })
        ),
        "{err}"
    );
}

#[test]
fn undefined_component_type_is_reported() {
    let applications = r#"{
      foo: { components: [{ component: "cache", title: "c" }] },
    }"#;
    let instances = r#"[
      { application: "foo", title: "prod", args: { nodes: { "Node[n1]": "Cache[c]" } } },
    ]"#;
    let err = compile(applications, instances).unwrap_err();
    assert!(matches!(err, Error::UndefinedComponentType { ref component_type, .. }
        if component_type == "cache"));
}

#[test]
fn components_missing_from_the_mapping_are_unmapped() {
    let instances = r#"[
      { application: "foo", title: "prod", args: { nodes: { "Node[n1]": "Db[one]" } } },
    ]"#;
    let err = compile(FOO, instances).unwrap_err();
    assert!(
        matches!(err, Error::UnmappedComponent { ref component, ref application }
            if component == &ResourceRef::new("Web", "two") && application == "Foo[prod]"),
        "{err}"
    );
}

#[test]
fn consumed_capabilities_must_be_passed() {
    let applications = r#"{
      foo: { components: [{ component: "web", title: "two" }] },
    }"#;
    let instances = r#"[
      { application: "foo", title: "prod", args: { nodes: { "Node[n2]": "Web[two]" } } },
    ]"#;
    let err = compile(applications, instances).unwrap_err();
    assert!(matches!(err, Error::MissingCapabilityArgument { ref parameter, .. }
        if parameter == "db"));
}

#[test]
fn consumed_capabilities_must_have_the_declared_kind() {
    let applications = r#"{
      foo: { components: [{ component: "web", title: "two", args: { db: "Http[one]" } }] },
    }"#;
    let instances = r#"[
      { application: "foo", title: "prod", args: { nodes: { "Node[n2]": "Web[two]" } } },
    ]"#;
    let err = compile(applications, instances).unwrap_err();
    assert!(
        matches!(err, Error::CapabilityTypeMismatch { ref expected, ref found, .. }
            if expected == "Sql" && found == "Http[one]"),
        "{err}"
    );
}

#[test]
fn unproduced_capabilities_fail_the_compile() {
    let applications = r#"{
      foo: { components: [{ component: "web", title: "two", args: { db: "Sql[gone]" } }] },
    }"#;
    let instances = r#"[
      { application: "foo", title: "prod", args: { nodes: { "Node[n2]": "Web[two]" } } },
    ]"#;
    let err = compile(applications, instances).unwrap_err();
    let Error::Scenario(ensemble_scenario::Error::UnresolvedCapability {
        component,
        node,
        capability,
    }) = err
    else {
        panic!("expected an unresolved capability");
    };
    assert_eq!(component, ResourceRef::new("Web", "two"));
    assert_eq!(node, "n2");
    assert_eq!(capability, CapabilityRef::new("Sql", "gone"));
}

#[test]
fn mutual_consumers_form_a_cycle() {
    let applications = r#"{
      pair: {
        components: [
          { component: "svc", title: "a", args: { peer: "Port[b]" } },
          { component: "svc", title: "b", args: { peer: "Port[a]" } },
        ],
      },
    }"#;
    let instances = r#"[
      { application: "pair", title: "p", args: { nodes: { "Node[n1]": "Svc[a]", "Node[n2]": "Svc[b]" } } },
    ]"#;
    let err = compile(applications, instances).unwrap_err();
    let Error::Scenario(ensemble_scenario::Error::CycleDetected { remaining, cycle }) = err else {
        panic!("expected a cycle");
    };
    assert_eq!(remaining.keys().collect::<Vec<_>>(), ["n1", "n2"]);
    assert_eq!(cycle.first(), cycle.last());
    assert!(cycle.contains(&"n1".to_string()) && cycle.contains(&"n2".to_string()));
}

#[test]
fn producer_policy_decides_shared_productions() {
    let types = r#"{
        mirror: { produces: [{ capability: "Sql", title: "$name" }] },
      }"#;
    let applications = r#"{
      twice: {
        components: [
          { component: "db", title: "one", args: { password: "a" } },
          { component: "mirror", title: "one" },
          { component: "web", title: "w", args: { db: "Sql[one]" } },
        ],
      },
    }"#;
    let instances = r#"[
      { application: "twice", title: "t",
        args: { nodes: { "Node[n1]": "Db[one]", "Node[n3]": "Mirror[one]", "Node[n2]": "Web[w]" } } },
    ]"#;
    let manifests = || {
        [
            manifest(&doc(applications, instances)),
            manifest(&format!(
                "{{ manifest_version: \"0.1.0\", component_types: {types} }}"
            )),
        ]
    };

    let first_match = Compiler::default().compile(&manifests()).unwrap();
    assert_eq!(first_match.order, ["n1", "n3", "n2"]);
    assert_eq!(
        first_match.graph.dependencies("n2").unwrap().iter().collect::<Vec<_>>(),
        ["n1"]
    );

    let options = CompileOptions::builder()
        .producer_policy(ProducerPolicy::Unique)
        .build();
    let err = Compiler::new(options).compile(&manifests()).unwrap_err();
    let Error::Scenario(ensemble_scenario::Error::AmbiguousProducer { producers, .. }) = err else {
        panic!("expected an ambiguous producer");
    };
    assert_eq!(
        producers,
        [ResourceRef::new("Db", "one"), ResourceRef::new("Mirror", "one")]
    );
}

#[test]
fn reporters_render_the_compile() {
    let output = foo();

    let text = TextReporter.emit(&output).unwrap();
    assert!(text.contains("Foo[prod]\n  Db[one] => Node[n1]\n    produces Sql[one]\n"));
    assert!(text.contains("  n1 (root)\n  n2 -> n1\n"));
    assert!(text.contains("Run order (production):\n  1. n1\n  2. n2\n"));

    let json: serde_json::Value =
        serde_json::from_str(&JsonReporter.emit(&output).unwrap()).unwrap();
    assert_eq!(json["order"], json!(["n1", "n2"]));
    assert_eq!(json["capabilities"]["Sql[one]"]["node"], "n1");
    assert_eq!(json["graph"]["n2"], json!(["n1"]));

    let dot = DotReporter.emit(&output).unwrap();
    assert!(dot.starts_with("digraph nodes {\n"));
    assert!(dot.contains("  \"n2\" -> \"n1\";\n"));
    assert!(dot.contains("  \"n1\" [label=\"n1\\n#1\"];\n"));

    let plan = PlanReporter::new("ssh {node} puppet agent -t --environment {environment}")
        .emit(&output)
        .unwrap();
    assert_eq!(
        plan,
        [
            "ssh n1 puppet agent -t --environment production",
            "ssh n2 puppet agent -t --environment production",
        ]
    );
    assert!(PlanReporter::new("puppet agent -t").emit(&output).is_err());
}

#[test]
fn report_round_trips_through_the_registry_format() {
    let output = foo();
    let text = JsonReporter.emit(&output).unwrap();
    let report = ensemble_scenario::EnvironmentReport::from_json(&text).unwrap();
    assert_eq!(report, output.report());
}

struct Unreachable;

impl Backend for Unreachable {
    fn find<'a>(
        &'a self,
        _environment: &'a str,
        _capability: &'a CapabilityRef,
    ) -> Pin<Box<dyn Future<Output = Result<Option<CapabilityValue>, ensemble_registry::Error>> + Send + 'a>>
    {
        Box::pin(std::future::ready(Err(ensemble_registry::Error::Io(
            std::io::Error::other("connection refused"),
        ))))
    }
}

#[tokio::test]
async fn node_capabilities_resolve_through_the_registry() {
    let output = foo();
    let registry = Registry::new().with_backend(
        "compiled",
        Arc::new(MemoryBackend::from_instances(
            &output.environment,
            &output.instances,
        )),
    );
    let instance = &output.instances[0];

    let resolved = resolve_node_capabilities(&registry, "production", instance, "n2")
        .await
        .unwrap();
    assert_eq!(resolved.len(), 1);
    assert_eq!(resolved[0].component, ResourceRef::new("Web", "two"));
    assert_eq!(resolved[0].value.node.as_deref(), Some("n1"));
    assert_eq!(resolved[0].value.parameters["user"], "admin");

    let producers = resolve_node_capabilities(&registry, "production", instance, "n1")
        .await
        .unwrap();
    assert!(producers.is_empty());

    let mut catalog = crate::NodeCatalog::new("n2", "production");
    for instance in output.instances_on("n2") {
        catalog.add_instance(&registry, instance).await.unwrap();
    }
    assert_eq!(catalog.components, [ResourceRef::new("Web", "two")]);
    assert_eq!(catalog.capabilities, resolved);
}

#[tokio::test]
async fn absent_and_unreachable_capabilities_are_distinct() {
    let output = foo();
    let instance = &output.instances[0];

    let err = resolve_node_capabilities(&Registry::new(), "production", instance, "n2")
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        Error::Scenario(ensemble_scenario::Error::UnresolvedCapability { .. })
    ));

    let registry = Registry::new().with_backend("down", Arc::new(Unreachable));
    let err = resolve_node_capabilities(&registry, "production", instance, "n2")
        .await
        .unwrap_err();
    assert!(
        matches!(err, Error::CapabilityLookupFailed { ref capability, .. }
            if capability == &CapabilityRef::new("Sql", "one")),
        "{err}"
    );
}

#[tokio::test]
async fn separately_compiled_producers_resolve_through_the_registry() {
    let store = r#"{ store: { components: [
        { component: "db", title: "ext", args: { password: "pw" } },
      ] } }"#;
    let store_instance = r#"[
      { application: "store", title: "main", args: { nodes: { "Node[db9]": "Db[ext]" } } },
    ]"#;
    let producer = compile(store, store_instance).unwrap();

    let shop = r#"{ shop: { components: [
        { component: "web", title: "two", args: { db: "Sql[ext]" } },
      ] } }"#;
    let shop_instance = r#"[
      { application: "shop", title: "main", args: { nodes: { "Node[n2]": "Web[two]" } } },
    ]"#;
    let consumer = manifest(&doc(shop, shop_instance));

    // Alone, the consumer cannot be ordered.
    let err = Compiler::default()
        .compile(std::slice::from_ref(&consumer))
        .unwrap_err();
    assert!(matches!(
        err,
        Error::Scenario(ensemble_scenario::Error::UnresolvedCapability { .. })
    ));

    let instances = Compiler::default()
        .instantiate(std::slice::from_ref(&consumer))
        .unwrap();
    assert_eq!(instances.len(), 1);

    let registry = Registry::new().with_backend(
        "store",
        Arc::new(MemoryBackend::from_instances(
            &producer.environment,
            &producer.instances,
        )),
    );
    let resolved = resolve_node_capabilities(&registry, "production", &instances[0], "n2")
        .await
        .unwrap();
    assert_eq!(resolved.len(), 1);
    assert_eq!(resolved[0].capability, CapabilityRef::new("Sql", "ext"));
    assert_eq!(resolved[0].value.node.as_deref(), Some("db9"));
    assert_eq!(resolved[0].value.parameters["host"], "ext.db");
}
