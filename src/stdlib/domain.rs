//! Biological values: sequences and cells. The type checker only sees them
//! as nominal `genome`, `protein` and `cell` types.

use serde::{Deserialize, Serialize};

use std::any::Any;
use std::fmt;
use std::rc::Rc;

use crate::runtime::{DomainRegistry, DomainValue, Value};
use crate::stdlib::{Natives, expect_int, expect_str};
use crate::{t_fn, t_int, t_nominal, t_string};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequenceKind {
    Genome,
    Protein,
}

impl SequenceKind {
    pub fn type_name(self) -> &'static str {
        match self {
            SequenceKind::Genome => "genome",
            SequenceKind::Protein => "protein",
        }
    }

    fn accepts(self, residue: char) -> bool {
        match self {
            SequenceKind::Genome => matches!(residue, 'A' | 'C' | 'G' | 'T'),
            SequenceKind::Protein => residue.is_ascii_uppercase(),
        }
    }
}

/// A normalized (upper-case) nucleotide or amino-acid sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sequence {
    kind: SequenceKind,
    residues: String,
}

impl Sequence {
    pub fn new(kind: SequenceKind, residues: &str) -> Result<Self, String> {
        let residues = residues.to_ascii_uppercase();
        if let Some(bad) = residues.chars().find(|&c| !kind.accepts(c)) {
            return Err(format!("invalid {} residue '{bad}'", kind.type_name()));
        }
        Ok(Sequence { kind, residues })
    }

    pub fn kind(&self) -> SequenceKind {
        self.kind
    }

    pub fn residues(&self) -> &str {
        &self.residues
    }

    /// Replaces the residue at `position`.
    pub fn mutate(&self, position: i64, residue: &str) -> Result<Self, String> {
        let len = self.residues.len() as i64;
        if position < 0 || position >= len {
            return Err(format!("mutation position {position} out of range for length {len}"));
        }
        let mut chars = residue.chars();
        let (Some(replacement), None) = (chars.next(), chars.next()) else {
            return Err(format!("expected a single residue, got '{residue}'"));
        };
        let position = position as usize;
        let mut residues = self.residues.clone();
        residues.replace_range(
            position..position + 1,
            replacement.encode_utf8(&mut [0; 4]),
        );
        Sequence::new(self.kind, &residues)
    }
}

impl fmt::Display for Sequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.residues)
    }
}

impl DomainValue for Sequence {
    fn type_name(&self) -> &str {
        self.kind.type_name()
    }

    fn serialize(&self) -> String {
        self.residues.clone()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// A genome together with the proteins it expresses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cell {
    genome: Sequence,
    proteins: Vec<Sequence>,
}

#[derive(Serialize, Deserialize)]
struct CellData {
    genome: String,
    proteins: Vec<String>,
}

impl Cell {
    pub fn new(genome: Sequence) -> Result<Self, String> {
        if genome.kind() != SequenceKind::Genome {
            return Err(format!("a cell needs a genome, found {}", genome.kind().type_name()));
        }
        Ok(Cell {
            genome,
            proteins: vec![],
        })
    }

    pub fn genome(&self) -> &Sequence {
        &self.genome
    }

    pub fn proteins(&self) -> &[Sequence] {
        &self.proteins
    }

    pub fn with_protein(&self, protein: Sequence) -> Result<Self, String> {
        if protein.kind() != SequenceKind::Protein {
            return Err(format!("expected a protein, found {}", protein.kind().type_name()));
        }
        let mut cell = self.clone();
        cell.proteins.push(protein);
        Ok(cell)
    }

    fn parse(data: &str) -> Result<Self, String> {
        let data: CellData = serde_json::from_str(data).map_err(|e| format!("invalid cell: {e}"))?;
        let proteins = data
            .proteins
            .iter()
            .map(|p| Sequence::new(SequenceKind::Protein, p))
            .collect::<Result<_, _>>()?;
        Ok(Cell {
            genome: Sequence::new(SequenceKind::Genome, &data.genome)?,
            proteins,
        })
    }
}

impl DomainValue for Cell {
    fn type_name(&self) -> &str {
        "cell"
    }

    fn serialize(&self) -> String {
        let data = CellData {
            genome: self.genome.residues.clone(),
            proteins: self.proteins.iter().map(|p| p.residues.clone()).collect(),
        };
        serde_json::to_string(&data).unwrap_or_default()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

fn domain<'a, T: 'static>(value: &'a Value, expected: &str, what: &str) -> Result<&'a T, String> {
    match value {
        Value::Domain(domain) if domain.type_name() == expected => domain
            .as_any()
            .downcast_ref::<T>()
            .ok_or_else(|| format!("{what} expects a {expected}, found {}", domain.type_name())),
        other => Err(format!("{what} expects a {expected}, found {}", other.type_name())),
    }
}

/// The sequence in `value`, which must be of `kind`.
fn sequence<'a>(value: &'a Value, kind: SequenceKind, what: &str) -> Result<&'a Sequence, String> {
    domain::<Sequence>(value, kind.type_name(), what)
}

fn construct(kind: SequenceKind, residues: &str) -> Result<Value, String> {
    Ok(Value::Domain(Rc::new(Sequence::new(kind, residues)?)))
}

pub fn add_domain_functions(natives: &mut Natives) {
    // genome(sequence: string) -> genome
    natives.insert(
        "genome",
        t_fn!([t_string!()] -> t_nominal!("genome")),
        |_, args| construct(SequenceKind::Genome, expect_str(&args[0], "genome")?),
    );

    // protein(sequence: string) -> protein
    natives.insert(
        "protein",
        t_fn!([t_string!()] -> t_nominal!("protein")),
        |_, args| construct(SequenceKind::Protein, expect_str(&args[0], "protein")?),
    );

    // genome_length(g: genome) -> int
    natives.insert(
        "genome_length",
        t_fn!([t_nominal!("genome")] -> t_int!()),
        |_, args| {
            let genome = sequence(&args[0], SequenceKind::Genome, "genome_length")?;
            Ok(Value::Int(genome.residues().len() as i64))
        },
    );

    // mutate(g: genome, position: int, base: string) -> genome
    natives.insert(
        "mutate",
        t_fn!([t_nominal!("genome"), t_int!(), t_string!()] -> t_nominal!("genome")),
        |_, args| {
            let genome = sequence(&args[0], SequenceKind::Genome, "mutate")?;
            let position = expect_int(&args[1], "mutate")?;
            let base = expect_str(&args[2], "mutate")?;
            Ok(Value::Domain(Rc::new(genome.mutate(position, base)?)))
        },
    );

    // cell(g: genome) -> cell
    natives.insert(
        "cell",
        t_fn!([t_nominal!("genome")] -> t_nominal!("cell")),
        |_, args| {
            let genome = sequence(&args[0], SequenceKind::Genome, "cell")?;
            Ok(Value::Domain(Rc::new(Cell::new(genome.clone())?)))
        },
    );

    // express(c: cell, p: protein) -> cell
    natives.insert(
        "express",
        t_fn!([t_nominal!("cell"), t_nominal!("protein")] -> t_nominal!("cell")),
        |_, args| {
            let cell = domain::<Cell>(&args[0], "cell", "express")?;
            let protein = sequence(&args[1], SequenceKind::Protein, "express")?;
            Ok(Value::Domain(Rc::new(cell.with_protein(protein.clone())?)))
        },
    );

    // protein_count(c: cell) -> int
    natives.insert(
        "protein_count",
        t_fn!([t_nominal!("cell")] -> t_int!()),
        |_, args| {
            let cell = domain::<Cell>(&args[0], "cell", "protein_count")?;
            Ok(Value::Int(cell.proteins().len() as i64))
        },
    );

    // cell_genome(c: cell) -> genome
    natives.insert(
        "cell_genome",
        t_fn!([t_nominal!("cell")] -> t_nominal!("genome")),
        |_, args| {
            let cell = domain::<Cell>(&args[0], "cell", "cell_genome")?;
            Ok(Value::Domain(Rc::new(cell.genome().clone())))
        },
    );
}

/// Deserializers for the sequence types, for use with [`Value::from_json`].
pub fn register_deserializers(registry: &mut DomainRegistry) {
    registry.register("genome", |data| {
        Ok(Rc::new(Sequence::new(SequenceKind::Genome, data)?) as Rc<dyn DomainValue>)
    });
    registry.register("protein", |data| {
        Ok(Rc::new(Sequence::new(SequenceKind::Protein, data)?) as Rc<dyn DomainValue>)
    });
    registry.register("cell", |data| {
        Ok(Rc::new(Cell::parse(data)?) as Rc<dyn DomainValue>)
    });
}
