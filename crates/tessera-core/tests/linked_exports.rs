//! End-to-end checks of capabilities exported with `#[export]`.

use std::sync::Arc;

use tessera_core::{
    Catalog, Composition, Instance, LinkedCatalog, Registry, SERVICE_TYPE_KEY, ServiceContainer,
    Signature, TypeFn, TypeInfo, TypeRef, Typed, Upcast, upcast,
};
use tessera_macros::export;

pub trait Greeter: Send + Sync {
    fn greet(&self) -> String;
}

pub static GREETER: TypeInfo = TypeInfo::interface("linked::Greeter");

pub struct English;

impl Greeter for English {
    fn greet(&self) -> String {
        "hello".to_owned()
    }
}

static ENGLISH_INTERFACES: [Upcast; 1] = [Upcast::new(&GREETER, upcast!(English => dyn Greeter))];
pub static ENGLISH: TypeInfo = TypeInfo::class("linked::English").implements(&ENGLISH_INTERFACES);

impl Typed for English {
    fn type_info() -> TypeRef {
        &ENGLISH
    }
}

pub struct French;

impl Greeter for French {
    fn greet(&self) -> String {
        "bonjour".to_owned()
    }
}

static FRENCH_INTERFACES: [Upcast; 1] = [Upcast::new(&GREETER, upcast!(French => dyn Greeter))];
pub static FRENCH: TypeInfo = TypeInfo::class("linked::French").implements(&FRENCH_INTERFACES);

impl Typed for French {
    fn type_info() -> TypeRef {
        &FRENCH
    }
}

#[export(value, contract = GREETER, priority = 1)]
fn english() -> English {
    English
}

#[export(name = "linked::Greeter", value, contract = GREETER, priority = 5, service_type = "linked::Greeter")]
fn french() -> French {
    French
}

#[export(name = "parse", priority = 2)]
pub fn parse_number(input: String) -> i64 {
    input.trim().parse().unwrap_or_default()
}

#[export(name = "broken", value, fallible)]
fn broken() -> Result<String, String> {
    Err("backend offline".to_owned())
}

static I32_TO_STRING_PARAMS: [TypeFn; 1] = [<i32 as Typed>::type_info];
static I32_TO_STRING: TypeInfo = TypeInfo::function(
    "linked::I32ToString",
    Signature::new(&I32_TO_STRING_PARAMS, <String as Typed>::type_info),
);

#[test]
fn linked_catalog_enumerates_every_export() {
    let descriptors = LinkedCatalog.descriptors().unwrap();
    assert_eq!(descriptors.len(), 4);

    let french = descriptors
        .iter()
        .find(|d| d.priority() == 5)
        .expect("french export");
    assert_eq!(french.name(), "linked::Greeter");
    assert_eq!(french.contract_type(), Some(&GREETER));
    assert_eq!(french.metadata()[SERVICE_TYPE_KEY], "linked::Greeter");
}

#[test]
fn composition_skips_failing_constructors() {
    let composition = Composition::linked();
    let report = composition.last_report();
    assert_eq!(report.catalogs, 1);
    assert_eq!(report.plugins, 3);
    assert_eq!(report.skipped, 1);
    assert!(composition.registry().get("broken").is_none());
}

#[test]
fn value_exports_resolve_through_their_contract() {
    let registry = Composition::linked().registry();

    let best = registry
        .get_one_dyn::<dyn Greeter>(Some("linked::Greeter"), &GREETER)
        .unwrap()
        .expect("a greeter");
    assert_eq!(best.greet(), "bonjour");

    let greetings: Vec<String> = registry
        .get_many_dyn::<dyn Greeter>(None, &GREETER)
        .unwrap()
        .iter()
        .map(|greeter| greeter.greet())
        .collect();
    assert_eq!(greetings, ["bonjour", "hello"]);
}

#[test]
fn callable_exports_bind_by_signature() {
    let registry = Composition::linked().registry();

    let parse = registry
        .get_one(Some("parse"), Some(&PARSE_NUMBER_TYPE))
        .unwrap()
        .expect("parse is exported");
    let parse = parse.downcast_ref::<fn(String) -> i64>().expect("fn pointer");
    assert_eq!(parse(" 42 ".to_owned()), 42);

    assert!(
        registry
            .get_one(Some("parse"), Some(&I32_TO_STRING))
            .unwrap()
            .is_none()
    );
}

#[test]
fn service_container_seeds_from_exports() {
    let registry: Arc<Registry> = Composition::linked().registry();
    let container = ServiceContainer::builder(&registry)
        .name("linked::Greeter")
        .build()
        .unwrap();

    let greeter = container
        .get_service(&GREETER)
        .unwrap()
        .and_then(|value: Instance| value.as_dyn::<dyn Greeter>())
        .expect("greeter service");
    assert_eq!(greeter.greet(), "bonjour");
}
