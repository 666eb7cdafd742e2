use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use crate::ast::{BinOp, UnOp};
use crate::ir::Constant;
use crate::lexer::unescape;

/// One stack-machine instruction. The text form is one mnemonic per line.
#[derive(Debug, Clone, PartialEq)]
pub enum Instruction {
    PushConst(Constant),
    Load(String),
    /// Assigns to an existing binding.
    Store(String),
    /// Binds a new local in the innermost scope.
    Declare(String),
    Pop,
    Binary(BinOp),
    Unary(UnOp),
    Jump(String),
    JumpIfFalse(String),
    Label(String),
    Call { name: String, argc: usize },
    Return,
    FuncStart(String),
    Param(String),
    FuncEnd,
    EnterScope,
    ExitScope,
}

pub fn binary_mnemonic(op: BinOp) -> &'static str {
    match op {
        BinOp::Add => "ADD",
        BinOp::Sub => "SUB",
        BinOp::Mul => "MUL",
        BinOp::Div => "DIV",
        BinOp::Mod => "MOD",
        BinOp::Eq => "EQ",
        BinOp::NotEq => "NEQ",
        BinOp::Less => "LT",
        BinOp::LessEq => "LTE",
        BinOp::Greater => "GT",
        BinOp::GreaterEq => "GTE",
        BinOp::And => "AND",
        BinOp::Or => "OR",
    }
}

fn binary_from_mnemonic(mnemonic: &str) -> Option<BinOp> {
    Some(match mnemonic {
        "ADD" => BinOp::Add,
        "SUB" => BinOp::Sub,
        "MUL" => BinOp::Mul,
        "DIV" => BinOp::Div,
        "MOD" => BinOp::Mod,
        "EQ" => BinOp::Eq,
        "NEQ" => BinOp::NotEq,
        "LT" => BinOp::Less,
        "LTE" => BinOp::LessEq,
        "GT" => BinOp::Greater,
        "GTE" => BinOp::GreaterEq,
        "AND" => BinOp::And,
        "OR" => BinOp::Or,
        _ => return None,
    })
}

impl Display for Instruction {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Instruction::PushConst(constant) => write!(f, "PUSH_CONST {constant}"),
            Instruction::Load(name) => write!(f, "LOAD {name}"),
            Instruction::Store(name) => write!(f, "STORE {name}"),
            Instruction::Declare(name) => write!(f, "DECLARE {name}"),
            Instruction::Pop => f.write_str("POP"),
            Instruction::Binary(op) => f.write_str(binary_mnemonic(*op)),
            Instruction::Unary(UnOp::Neg) => f.write_str("NEG"),
            Instruction::Unary(UnOp::Not) => f.write_str("NOT"),
            Instruction::Jump(label) => write!(f, "JUMP {label}"),
            Instruction::JumpIfFalse(label) => write!(f, "JUMP_IF_FALSE {label}"),
            Instruction::Label(label) => write!(f, "LABEL {label}"),
            Instruction::Call { name, argc } => write!(f, "CALL {name} {argc}"),
            Instruction::Return => f.write_str("RETURN"),
            Instruction::FuncStart(name) => write!(f, "FUNC_START {name}"),
            Instruction::Param(name) => write!(f, "PARAM {name}"),
            Instruction::FuncEnd => f.write_str("FUNC_END"),
            Instruction::EnterScope => f.write_str("ENTER_SCOPE"),
            Instruction::ExitScope => f.write_str("EXIT_SCOPE"),
        }
    }
}

impl FromStr for Instruction {
    type Err = String;

    fn from_str(line: &str) -> Result<Self, String> {
        let line = line.trim();
        let (mnemonic, operand) = match line.split_once(char::is_whitespace) {
            Some((mnemonic, rest)) => (mnemonic, rest.trim()),
            None => (line, ""),
        };

        let name = || {
            if operand.is_empty() || operand.contains(char::is_whitespace) {
                Err(format!("'{mnemonic}' expects a single name operand"))
            } else {
                Ok(operand.to_string())
            }
        };
        let bare = |instruction: Instruction| {
            if operand.is_empty() {
                Ok(instruction)
            } else {
                Err(format!("'{mnemonic}' takes no operand"))
            }
        };

        match mnemonic {
            "PUSH_CONST" => parse_constant(operand).map(Instruction::PushConst),
            "LOAD" => name().map(Instruction::Load),
            "STORE" => name().map(Instruction::Store),
            "DECLARE" => name().map(Instruction::Declare),
            "POP" => bare(Instruction::Pop),
            "NEG" => bare(Instruction::Unary(UnOp::Neg)),
            "NOT" => bare(Instruction::Unary(UnOp::Not)),
            "JUMP" => name().map(Instruction::Jump),
            "JUMP_IF_FALSE" => name().map(Instruction::JumpIfFalse),
            "LABEL" => name().map(Instruction::Label),
            "CALL" => {
                let mut parts = operand.split_whitespace();
                match (parts.next(), parts.next(), parts.next()) {
                    (Some(name), Some(argc), None) => {
                        let argc = argc
                            .parse()
                            .map_err(|_| format!("invalid argument count '{argc}'"))?;
                        Ok(Instruction::Call {
                            name: name.to_string(),
                            argc,
                        })
                    }
                    _ => Err("'CALL' expects a name and an argument count".to_string()),
                }
            }
            "RETURN" => bare(Instruction::Return),
            "FUNC_START" => name().map(Instruction::FuncStart),
            "PARAM" => name().map(Instruction::Param),
            "FUNC_END" => bare(Instruction::FuncEnd),
            "ENTER_SCOPE" => bare(Instruction::EnterScope),
            "EXIT_SCOPE" => bare(Instruction::ExitScope),
            _ => match binary_from_mnemonic(mnemonic) {
                Some(op) => bare(Instruction::Binary(op)),
                None => Err(format!("unknown instruction '{mnemonic}'")),
            },
        }
    }
}

/// Parses the operand of `PUSH_CONST`.
pub fn parse_constant(text: &str) -> Result<Constant, String> {
    match text {
        "()" => return Ok(Constant::Unit),
        "true" => return Ok(Constant::Bool(true)),
        "false" => return Ok(Constant::Bool(false)),
        _ => {}
    }
    if let Some(body) = text.strip_prefix('"') {
        let body = body
            .strip_suffix('"')
            .filter(|body| !ends_with_escape(body))
            .ok_or_else(|| format!("unterminated string constant {text}"))?;
        return Ok(Constant::Str(unescape(body)));
    }
    if let Ok(i) = text.parse::<i64>() {
        return Ok(Constant::Int(i));
    }
    text.parse::<f64>()
        .map(Constant::Float)
        .map_err(|_| format!("invalid constant '{text}'"))
}

/// Whether the closing quote is itself escaped.
fn ends_with_escape(body: &str) -> bool {
    body.chars().rev().take_while(|&c| c == '\\').count() % 2 == 1
}
