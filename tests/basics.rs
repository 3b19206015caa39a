use structuremap::{
    plugs, BuildFailure, ContainerError, Describe, Instance, Lifecycle, Pluggable, Registry, Resolver,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

trait Greeter: Send + Sync {
    fn greet(&self) -> String;
}

struct English;
impl Greeter for English {
    fn greet(&self) -> String {
        "hello".into()
    }
}
impl Pluggable for English {
    fn describe(d: &mut Describe<Self>) {
        d.constructor(|_| Ok(English));
    }
}

struct French;
impl Greeter for French {
    fn greet(&self) -> String {
        "bonjour".into()
    }
}
impl Pluggable for French {
    fn describe(d: &mut Describe<Self>) {
        d.constructor(|_| Ok(French));
    }
}

plugs!(English => dyn Greeter);
plugs!(French => dyn Greeter);

struct Engine {
    cylinders: u32,
}

struct Car {
    engine: Option<Arc<Engine>>,
    color: String,
}

impl Pluggable for Car {
    fn describe(d: &mut Describe<Self>) {
        d.constructor(|_| {
            Ok(Car {
                engine: None,
                color: "grey".into(),
            })
        });
        d.constructor(|args| {
            Ok(Car {
                engine: Some(args.get::<Engine>("engine")?),
                color: "grey".into(),
            })
        })
        .dependency::<Engine>("engine");
        d.setter_value::<String, _>("color", |car, color| car.color = color);
    }
}

#[test]
fn test_singleton_and_transient() {
    let mut registry = Registry::new();
    registry.for_type::<dyn Greeter>().singleton().use_type::<English>();
    registry.for_type::<French>().use_type::<French>();
    let container = registry.build();

    let a = container.get_instance::<dyn Greeter>().unwrap();
    let b = container.get_instance::<dyn Greeter>().unwrap();
    assert!(Arc::ptr_eq(&a, &b));
    assert_eq!(a.greet(), "hello");

    let c = container.get_instance::<French>().unwrap();
    let d = container.get_instance::<French>().unwrap();
    assert!(!Arc::ptr_eq(&c, &d));
}

#[test]
fn test_named_and_all_instances() {
    let mut registry = Registry::new();
    registry.for_type::<dyn Greeter>().use_type::<English>().named("en");
    registry.for_type::<dyn Greeter>().add_type::<French>().named("fr");
    let container = registry.build();

    assert_eq!(container.get_instance::<dyn Greeter>().unwrap().greet(), "hello");
    assert_eq!(container.get_named_instance::<dyn Greeter>("fr").unwrap().greet(), "bonjour");
    assert_eq!(container.get_named_instance::<dyn Greeter>("default").unwrap().greet(), "hello");

    let all: Vec<String> = container
        .get_all_instances::<dyn Greeter>()
        .unwrap()
        .iter()
        .map(|g| g.greet())
        .collect();
    assert_eq!(all, vec!["hello", "bonjour"]);
}

#[test]
fn test_missing_family() {
    struct Unregistered;

    let container = Registry::new().build();
    assert!(container.try_get_instance::<Unregistered>().unwrap().is_none());
    match container.get_instance::<Unregistered>() {
        Err(ContainerError::MissingPluginFamily(name)) => assert!(name.contains("Unregistered")),
        other => panic!("unexpected: {:?}", other.map(|_| ())),
    }
    assert!(container.get_all_instances::<Unregistered>().unwrap().is_empty());
}

#[test]
fn test_unknown_name_is_unresolvable() {
    let mut registry = Registry::new();
    registry.for_type::<dyn Greeter>().use_type::<English>();
    let container = registry.build();

    assert!(container.try_get_named_instance::<dyn Greeter>("de").unwrap().is_none());
    assert!(matches!(
        container.get_named_instance::<dyn Greeter>("de"),
        Err(ContainerError::UnresolvableInstance { .. })
    ));
}

#[test]
fn test_ambiguous_family_has_no_default() {
    let mut registry = Registry::new();
    registry.for_type::<dyn Greeter>().add_type::<English>();
    registry.for_type::<dyn Greeter>().add_type::<French>();
    let container = registry.build();

    assert!(container.get_instance::<dyn Greeter>().is_err());
    assert_eq!(container.get_all_instances::<dyn Greeter>().unwrap().len(), 2);
}

#[test]
fn test_missing_named_instance_policy() {
    let mut registry = Registry::new();
    registry
        .for_type::<String>()
        .use_value(Arc::new("plain".into()))
        .named("plain");
    registry
        .for_type::<String>()
        .missing_named_instance_is(|name| Some(Instance::object::<String>(Arc::new(name.to_uppercase()))));
    let container = registry.build();

    let shout = container.get_named_instance::<String>("abc").unwrap();
    assert_eq!(*shout, "ABC");
    let again = container.get_named_instance::<String>("abc").unwrap();
    assert!(Arc::ptr_eq(&shout, &again));
    assert_eq!(*container.get_named_instance::<String>("plain").unwrap(), "plain");
}

#[test]
fn test_concrete_types_register_themselves() {
    let container = Registry::new().build();
    let car = container.get_concrete::<Car>().unwrap();
    assert!(car.engine.is_none());
    assert_eq!(car.color, "grey");
}

#[test]
fn test_greediest_satisfiable_constructor_and_setters() {
    let mut registry = Registry::new();
    registry.for_type::<Engine>().use_value(Arc::new(Engine { cylinders: 6 }));
    registry
        .for_type::<Car>()
        .use_type::<Car>()
        .setter_value("color", "red".to_string());
    let container = registry.build();

    let car = container.get_instance::<Car>().unwrap();
    assert_eq!(car.engine.as_ref().unwrap().cylinders, 6);
    assert_eq!(car.color, "red");
}

#[test]
fn test_inline_and_named_dependencies() {
    let mut registry = Registry::new();
    registry
        .for_type::<Engine>()
        .add_value(Arc::new(Engine { cylinders: 8 }))
        .named("v8");
    registry
        .for_type::<Engine>()
        .add_value(Arc::new(Engine { cylinders: 4 }))
        .named("i4");
    registry.for_type::<Car>().use_type::<Car>().ctor_named("engine", "v8");
    registry
        .for_type::<Car>()
        .add_type::<Car>()
        .named("custom")
        .ctor_instance("engine", Instance::object::<Engine>(Arc::new(Engine { cylinders: 12 })));
    let container = registry.build();

    assert_eq!(container.get_instance::<Car>().unwrap().engine.as_ref().unwrap().cylinders, 8);
    let custom = container.get_named_instance::<Car>("custom").unwrap();
    assert_eq!(custom.engine.as_ref().unwrap().cylinders, 12);
}

#[test]
fn test_preferred_constructor_wins() {
    struct Picky {
        via: &'static str,
    }
    impl Pluggable for Picky {
        fn describe(d: &mut Describe<Self>) {
            d.constructor(|args| {
                args.get::<Engine>("engine")?;
                Ok(Picky { via: "greedy" })
            })
            .dependency::<Engine>("engine");
            d.constructor(|_| Ok(Picky { via: "preferred" })).preferred();
        }
    }

    let mut registry = Registry::new();
    registry.for_type::<Engine>().use_value(Arc::new(Engine { cylinders: 4 }));
    let container = registry.build();
    assert_eq!(container.get_concrete::<Picky>().unwrap().via, "preferred");
}

#[test]
fn test_factories_resolve_through_the_session() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();

    let mut registry = Registry::new();
    registry.for_type::<Engine>().use_value(Arc::new(Engine { cylinders: 3 }));
    registry
        .for_type::<Car>()
        .lifecycle_is(Lifecycle::Singleton)
        .use_factory(move |session| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(Arc::new(Car {
                engine: Some(session.get_instance::<Engine>()?),
                color: "blue".into(),
            }))
        });
    let container = registry.build();

    container.get_instance::<Car>().unwrap();
    let car = container.get_instance::<Car>().unwrap();
    assert_eq!(car.engine.as_ref().unwrap().cylinders, 3);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn test_constructor_errors_carry_the_build_path() {
    struct Broken;
    impl Pluggable for Broken {
        fn describe(d: &mut Describe<Self>) {
            d.constructor(|_| Err("disk full".into()));
        }
    }

    struct Panicky;
    impl Pluggable for Panicky {
        fn describe(d: &mut Describe<Self>) {
            d.constructor(|_| panic!("no luck"));
        }
    }

    let container = Registry::new().build();
    let err = container.get_concrete::<Broken>().err().unwrap();
    match &err {
        ContainerError::Build(build) => {
            assert_eq!(build.path.len(), 1);
            assert!(matches!(build.failure, BuildFailure::Constructor(_)));
        }
        other => panic!("unexpected: {}", other),
    }
    assert!(err.to_string().contains("disk full"));

    let err = container.get_concrete::<Panicky>().err().unwrap();
    assert!(err.to_string().contains("constructor panicked: no luck"));
}

#[test]
fn test_type_mismatch_on_explicit_plugin_type() {
    let mut registry = Registry::new();
    registry.for_type::<u32>().use_value(Arc::new(5));
    let container = registry.build();

    let result = container.get_instance_as::<String>(&structuremap::PluginType::of::<u32>(), None);
    assert!(matches!(result, Err(ContainerError::TypeMismatch { .. })));
}
