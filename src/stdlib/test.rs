use super::*;
use crate::errors::ErrorKind;
use crate::runtime::DomainRegistry;
use crate::{t_fn, t_int};

use pretty_assertions::assert_eq;
use std::fs;

fn call(name: &str, args: &[Value]) -> Result<Value, String> {
    call_with(&PrintHandler::buffer(), name, args)
}

fn call_with(out: &PrintHandler, name: &str, args: &[Value]) -> Result<Value, String> {
    let natives = Natives::standard();
    let native = natives
        .get(name)
        .unwrap_or_else(|| panic!("no native named {name}"));
    assert_eq!(native.arity(), args.len(), "arity of {name}");
    (native.func)(out, args)
}

fn s(text: &str) -> Value {
    Value::Str(text.into())
}

#[test]
fn test_print_and_str() {
    let out = PrintHandler::buffer();
    call_with(&out, "print", &[Value::Float(2.0)]).unwrap();
    call_with(&out, "print", &[s("done")]).unwrap();
    assert_eq!(out.output(), "2.0\ndone\n");
    assert_eq!(call("str", &[Value::Bool(false)]), Ok(s("false")));
    assert_eq!(call("log_info", &[s("quiet")]), Ok(Value::Unit));
}

#[test]
fn test_math_natives() {
    assert_eq!(call("abs", &[Value::Int(-4)]), Ok(Value::Int(4)));
    assert!(call("abs", &[Value::Int(i64::MIN)]).unwrap_err().contains("overflow"));
    assert_eq!(call("sqrt", &[Value::Float(9.0)]), Ok(Value::Float(3.0)));
    assert!(call("sqrt", &[Value::Float(-1.0)]).is_err());
    assert_eq!(
        call("pow", &[Value::Float(2.0), Value::Float(10.0)]),
        Ok(Value::Float(1024.0))
    );
    assert_eq!(call("float", &[Value::Int(3)]), Ok(Value::Float(3.0)));
    assert_eq!(call("int", &[Value::Float(-2.9)]), Ok(Value::Int(-2)));
    assert!(call("int", &[Value::Float(1e30)]).is_err());
    assert!(call("int", &[Value::Float(f64::NAN)]).is_err());
}

#[test]
fn test_string_natives() {
    assert_eq!(call("len", &[s("héllo")]), Ok(Value::Int(5)));
    assert_eq!(call("upper", &[s("acgt")]), Ok(s("ACGT")));
    assert_eq!(call("lower", &[s("MKV")]), Ok(s("mkv")));
    assert_eq!(
        call("substring", &[s("genome"), Value::Int(1), Value::Int(3)]),
        Ok(s("eno"))
    );
    assert_eq!(
        call("substring", &[s("genome"), Value::Int(4), Value::Int(10)]),
        Ok(s("me"))
    );
    assert!(call("substring", &[s("abc"), Value::Int(3), Value::Int(1)]).is_err());
    assert!(call("substring", &[s("abc"), Value::Int(0), Value::Int(-1)]).is_err());
    assert!(call("len", &[Value::Int(3)]).unwrap_err().contains("expects a string"));
}

#[test]
fn test_sequences_normalize_and_validate() {
    let genome = call("genome", &[s("acgT")]).unwrap();
    assert_eq!(genome.to_string(), "genome(ACGT)");
    assert_eq!(genome.type_name(), "genome");
    assert_eq!(call("genome_length", &[genome.clone()]), Ok(Value::Int(4)));

    assert_eq!(
        call("genome", &[s("ACGU")]).unwrap_err(),
        "invalid genome residue 'U'"
    );
    let protein = call("protein", &[s("mkv")]).unwrap();
    assert_eq!(protein.type_name(), "protein");
    assert!(call("genome_length", &[protein]).is_err());
}

#[test]
fn test_mutate_returns_new_sequence() {
    let genome = call("genome", &[s("ACGT")]).unwrap();
    let mutated = call("mutate", &[genome.clone(), Value::Int(1), s("t")]).unwrap();
    assert_eq!(mutated.to_string(), "genome(ATGT)");
    assert_eq!(genome.to_string(), "genome(ACGT)");

    assert!(call("mutate", &[genome.clone(), Value::Int(4), s("A")])
        .unwrap_err()
        .contains("out of range"));
    assert!(call("mutate", &[genome.clone(), Value::Int(0), s("AA")]).is_err());
    assert!(call("mutate", &[genome, Value::Int(0), s("X")]).is_err());
}

#[test]
fn test_sequence_natives_check_the_kind() {
    let protein = call("protein", &[s("MKV")]).unwrap();
    assert_eq!(
        call("genome_length", &[protein.clone()]).unwrap_err(),
        "genome_length expects a genome, found protein"
    );
    assert!(call("mutate", &[protein, Value::Int(0), s("A")])
        .unwrap_err()
        .contains("expects a genome"));
    assert!(call("genome_length", &[s("ACGT")])
        .unwrap_err()
        .contains("found string"));
}

#[test]
fn test_cells_collect_proteins() {
    let genome = call("genome", &[s("ACGT")]).unwrap();
    let cell = call("cell", &[genome.clone()]).unwrap();
    assert_eq!(cell.type_name(), "cell");
    assert_eq!(call("protein_count", &[cell.clone()]), Ok(Value::Int(0)));

    let protein = call("protein", &[s("mkv")]).unwrap();
    let grown = call("express", &[cell.clone(), protein.clone()]).unwrap();
    assert_eq!(call("protein_count", &[grown.clone()]), Ok(Value::Int(1)));
    assert_eq!(call("protein_count", &[cell.clone()]), Ok(Value::Int(0)));
    assert_eq!(call("cell_genome", &[grown.clone()]), Ok(genome.clone()));
    assert_eq!(
        grown.to_string(),
        r#"cell({"genome":"ACGT","proteins":["MKV"]})"#
    );

    assert!(call("cell", &[protein.clone()]).is_err());
    assert!(call("express", &[cell.clone(), genome]).is_err());
    assert!(call("protein_count", &[protein]).unwrap_err().contains("expects a cell"));
}

#[test]
fn test_cell_deserializer() {
    let mut registry = DomainRegistry::default();
    domain::register_deserializers(&mut registry);
    let cell = registry
        .deserialize("cell", r#"{"genome":"acgt","proteins":["MKV","LL"]}"#)
        .unwrap();
    assert_eq!(cell.serialize(), r#"{"genome":"ACGT","proteins":["MKV","LL"]}"#);
    assert!(registry
        .deserialize("cell", r#"{"genome":"ACGU","proteins":[]}"#)
        .unwrap_err()
        .contains("invalid genome residue"));
    assert!(registry.deserialize("cell", "ACGT").unwrap_err().contains("invalid cell"));
}

#[test]
fn test_sequence_deserializers() {
    let mut registry = DomainRegistry::default();
    domain::register_deserializers(&mut registry);
    let protein = registry.deserialize("protein", "mkv").unwrap();
    assert_eq!(protein.serialize(), "MKV");
    assert!(registry.deserialize("genome", "XYZ").is_err());
    assert!(registry
        .deserialize("plasmid", "ACGT")
        .unwrap_err()
        .contains("no deserializer"));
}

#[test]
fn test_prelude_marks_natives() {
    let natives = Natives::standard();
    let prelude = natives.prelude();
    let print = prelude.lookup("print").unwrap();
    assert!(print.function);
    assert_eq!(print.metadata.get("native").map(String::as_str), Some("true"));
    assert_eq!(prelude.globals().len(), natives.len());
}

#[test]
fn test_insert_replaces_by_name() {
    let mut natives = Natives::standard();
    let count = natives.len();
    natives.insert("len", t_fn!([] -> t_int!()), |_, _| Ok(Value::Int(0)));
    assert_eq!(natives.len(), count);
    assert_eq!(natives.get("len").unwrap().arity(), 0);
}

#[test]
fn test_install_binds_globals() {
    let natives = Natives::standard();
    let mut rt = Runtime::default();
    natives.install(&mut rt).unwrap();
    assert_eq!(rt.heap().stats().live, natives.len());
    let value = rt.lookup("sqrt", crate::span::Span::default()).unwrap();
    assert!(matches!(value, Value::Native(native) if native.name == "sqrt"));
}

fn loader() -> StdlibLoader {
    StdlibLoader::new(Natives::standard())
}

#[test]
fn test_modules_see_earlier_exports() {
    let mut loader = loader();
    let geometry = loader
        .load_source("geometry", "fn square(x: int) -> int { return x * x; }")
        .unwrap();
    let names: Vec<_> = geometry.exports().iter().map(|s| s.name.as_str()).collect();
    assert_eq!(names, vec!["square"]);

    loader
        .load_source(
            "shapes",
            "let unit = 1;\nfn area(side: int) -> int { return square(side) * unit; }",
        )
        .unwrap();
    assert_eq!(loader.module_names().collect::<Vec<_>>(), vec!["geometry", "shapes"]);
    assert_eq!(
        loader.export_names().collect::<Vec<_>>(),
        vec!["square", "area", "unit"]
    );
}

#[test]
fn test_load_errors_name_the_module() {
    let mut loader = loader();
    let err = loader.load_source("broken", "fn f( {").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Load);
    assert!(err.message().starts_with("in module 'broken':"), "{}", err.message());

    let err = loader
        .load_source("typed", "let a: int = true; let b: bool = 1;")
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Load);
    assert!(err.message().contains("(and 1 more error(s))"), "{}", err.message());
    assert!(loader.libraries().is_empty());
}

#[test]
fn test_redefinitions_are_rejected() {
    let mut loader = loader();
    loader.load_source("a", "fn helper() -> int { return 1; }").unwrap();

    let err = loader.load_source("a", "let x = 1;").unwrap_err();
    assert_eq!(err.message(), "module 'a' is already loaded");

    let err = loader
        .load_source("b", "fn helper() -> int { return 2; }")
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Load);
    assert!(err.message().contains("'helper' is already declared"), "{}", err.message());

    let err = loader
        .load_source("c", "fn print(x: int) { }")
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Load);
}

#[test]
fn test_inject_detects_collisions() {
    let mut loader = loader();
    loader.load_source("tools", "fn tool() -> int { return 1; }").unwrap();

    let mut table = SymbolTable::new();
    loader.inject(&mut table).unwrap();
    let tool = table.lookup("tool").unwrap();
    assert_eq!(tool.metadata.get("module").map(String::as_str), Some("tools"));

    let err = loader.inject(&mut table).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Load);
    assert!(err.message().contains("collides"));
}

#[test]
fn test_load_dir_in_file_name_order() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(
        dir.path().join("b_stats.hl"),
        "fn mean2(a: int, b: int) -> int { return sum2(a, b) / 2; }",
    )
    .unwrap();
    fs::write(
        dir.path().join("a_base.hl"),
        "fn sum2(a: int, b: int) -> int { return a + b; }",
    )
    .unwrap();
    fs::write(dir.path().join("notes.txt"), "not a module").unwrap();

    let mut loader = loader();
    assert_eq!(loader.load_dir(dir.path()).unwrap(), 2);
    assert_eq!(loader.module_names().collect::<Vec<_>>(), vec!["a_base", "b_stats"]);
}

#[test]
fn test_load_dir_requires_library_files() {
    let dir = tempfile::tempdir().unwrap();
    let err = loader().load_dir(dir.path()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Load);
    assert!(err.message().contains("no library files"));

    let err = loader().load_dir(&dir.path().join("missing")).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Load);
}
