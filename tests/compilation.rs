use structuremap::{
    plugs, BuildError, BuildFailure, ContainerError, Describe, Pluggable, PluginType, Problem, Registry, Resolver,
};
use std::sync::Arc;

trait Transport: Send + Sync {
    fn scheme(&self) -> &'static str;
}

struct Smtp;
impl Transport for Smtp {
    fn scheme(&self) -> &'static str {
        "smtp"
    }
}

struct Mailer {
    host: String,
    transport: Arc<dyn Transport>,
}

impl Pluggable for Mailer {
    fn describe(d: &mut Describe<Self>) {
        d.constructor(|args| {
            Ok(Mailer {
                host: args.value::<String>("host")?,
                transport: args.get::<dyn Transport>("transport")?,
            })
        })
        .value::<String>("host")
        .dependency::<dyn Transport>("transport");
    }
}

fn problems_of(err: ContainerError) -> Vec<Problem> {
    match err {
        ContainerError::Build(BuildError {
            failure: BuildFailure::Problems(problems),
            ..
        }) => problems,
        other => panic!("expected plan problems, got: {}", other),
    }
}

#[test]
fn test_every_problem_is_reported_at_once() {
    let mut registry = Registry::new();
    registry.for_type::<Mailer>().use_type::<Mailer>();
    let container = registry.build();

    let problems = problems_of(container.get_instance::<Mailer>().err().unwrap());
    assert_eq!(problems.len(), 2);
    assert!(problems[0].location.contains("'host'"));
    assert!(problems[0].description.contains("must be supplied"));
    assert!(problems[1].location.contains("'transport'"));
    assert!(problems[1].description.contains("no plugin family"));
}

#[test]
fn test_argument_problems() {
    let mut registry = Registry::new();
    registry
        .for_type::<dyn Transport>()
        .use_value(Arc::new(Smtp) as Arc<dyn Transport>);
    registry
        .for_type::<Mailer>()
        .use_type::<Mailer>()
        .ctor_value("host", 25u32)
        .ctor_value("port", 25u16);
    registry
        .for_type::<Mailer>()
        .add_type::<Mailer>()
        .named("relay")
        .ctor_value("host", "relay.local".to_string())
        .ctor_named("transport", "smtps");
    let container = registry.build();

    let problems = problems_of(container.get_instance::<Mailer>().err().unwrap());
    let text: Vec<String> = problems.iter().map(|p| p.to_string()).collect();
    assert_eq!(text.len(), 2, "{:?}", text);
    assert!(text[0].contains("supplied value is a u32"));
    assert!(text[1].contains("no parameter named 'port'"));

    let problems = problems_of(container.get_named_instance::<Mailer>("relay").err().unwrap());
    assert_eq!(problems.len(), 1);
    assert!(problems[0].description.contains("no instance named 'smtps'"));
}

#[test]
fn test_configured_mailer_builds() {
    let mut registry = Registry::new();
    registry
        .for_type::<dyn Transport>()
        .use_value(Arc::new(Smtp) as Arc<dyn Transport>)
        .named("smtp");
    registry
        .for_type::<Mailer>()
        .use_type::<Mailer>()
        .ctor_value("host", "mail.local".to_string())
        .ctor_named("transport", "smtp");
    let container = registry.build();

    assert!(container.assert_configuration_is_valid().is_ok());
    let mailer = container.get_instance::<Mailer>().unwrap();
    assert_eq!(mailer.host, "mail.local");
    assert_eq!(mailer.transport.scheme(), "smtp");
}

#[test]
fn test_assert_configuration_collects_problems_from_every_family() {
    struct Report {
        _mailer: Arc<Mailer>,
    }
    impl Pluggable for Report {
        fn describe(d: &mut Describe<Self>) {
            d.constructor(|args| {
                Ok(Report {
                    _mailer: args.get::<Mailer>("mailer")?,
                })
            })
            .dependency::<Mailer>("mailer")
            .value::<u8>("copies");
        }
    }

    let mut registry = Registry::new();
    registry.for_type::<Mailer>().use_type::<Mailer>();
    registry.for_type::<Report>().use_type::<Report>();
    let container = registry.build();

    match container.assert_configuration_is_valid() {
        Err(ContainerError::ConfigurationProblem(problems)) => {
            assert_eq!(problems.len(), 3);
            assert!(problems[2].location.contains("'copies'"));
        }
        other => panic!("unexpected: {:?}", other),
    }
}

trait Stage: Send + Sync {
    fn name(&self) -> &'static str;
}

struct Parse;
impl Stage for Parse {
    fn name(&self) -> &'static str {
        "parse"
    }
}
impl Pluggable for Parse {
    fn describe(d: &mut Describe<Self>) {
        d.constructor(|_| Ok(Parse));
    }
}

struct Emit;
impl Stage for Emit {
    fn name(&self) -> &'static str {
        "emit"
    }
}
impl Pluggable for Emit {
    fn describe(d: &mut Describe<Self>) {
        d.constructor(|_| Ok(Emit));
    }
}

plugs!(Parse => dyn Stage);
plugs!(Emit => dyn Stage);

struct Pipeline {
    stages: Vec<Arc<dyn Stage>>,
}

impl Pluggable for Pipeline {
    fn describe(d: &mut Describe<Self>) {
        d.constructor(|args| {
            Ok(Pipeline {
                stages: args.all::<dyn Stage>("stages")?,
            })
        })
        .all::<dyn Stage>("stages");
    }
}

#[test]
fn test_collection_parameters_get_every_instance_in_order() {
    let mut registry = Registry::new();
    registry.for_type::<dyn Stage>().add_type::<Parse>();
    registry.for_type::<dyn Stage>().add_type::<Emit>();
    let container = registry.build();

    let pipeline = container.get_concrete::<Pipeline>().unwrap();
    let names: Vec<_> = pipeline.stages.iter().map(|s| s.name()).collect();
    assert_eq!(names, vec!["parse", "emit"]);

    let empty = Registry::new().build().get_concrete::<Pipeline>().unwrap();
    assert!(empty.stages.is_empty());
}

#[test]
fn test_plans_are_compiled_once_and_reused() {
    let mut registry = Registry::new();
    registry.for_type::<dyn Stage>().singleton().use_type::<Parse>();
    let container = registry.build();

    let family = container.graph().find_family(&PluginType::of::<dyn Stage>()).unwrap();
    let instance = family.default_instance().unwrap();
    let first = container.graph().plan_for(&family, &instance);
    let second = container.graph().plan_for(&family, &instance);
    assert!(Arc::ptr_eq(&first, &second));
    assert!(first.problems().is_empty());
    assert!(first.describe().starts_with("Singleton '"));
    assert!(first.describe().contains("new "));

    let before = container.graph().plan_count();
    container.get_instance::<dyn Stage>().unwrap();
    container.get_instance::<dyn Stage>().unwrap();
    assert_eq!(container.graph().plan_count(), before);
}
