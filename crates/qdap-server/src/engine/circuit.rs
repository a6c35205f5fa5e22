//! Parsing OpenQASM-style source into executable instructions.
//!
//! Every `;`-terminated statement is one instruction. A gate definition
//! contributes its header (up to `{`), each body statement, and a closing
//! `}` instruction that returns to the caller.

use super::statevector::{gates, Matrix};
use super::{EngineError, EngineResult};
use std::collections::HashMap;

/// Largest register the dense simulator accepts.
pub(crate) const MAX_QUBITS: usize = 16;

/// Source span of one instruction, end inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Span {
    pub start: usize,
    pub end: usize,
}

/// `name` or `name[index]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Operand {
    pub register: String,
    pub index: Option<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum AssertionKind {
    /// Every pair of targets is entangled.
    Entanglement,
    /// The targets are in a superposition of basis states.
    Superposition,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Kind {
    /// Header lines, declarations and barriers.
    Nop,
    /// A single-qubit matrix on the last operand, controlled by the others.
    Gate {
        matrix: Matrix,
        operands: Vec<Operand>,
    },
    Swap {
        operands: Vec<Operand>,
    },
    Measure {
        qubits: Operand,
        bits: Operand,
    },
    Reset(Operand),
    Assert {
        kind: AssertionKind,
        targets: Vec<Operand>,
    },
    /// Header of a custom gate; `end` is the index of its closing `}`.
    Definition {
        formals: Vec<String>,
        end: usize,
    },
    Call {
        definition: usize,
        arguments: Vec<Operand>,
    },
    Return,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Instruction {
    pub span: Span,
    pub kind: Kind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Register {
    pub name: String,
    pub start: usize,
    pub size: usize,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct Circuit {
    pub instructions: Vec<Instruction>,
    pub qubits: Vec<Register>,
    pub bits: Vec<Register>,
}

impl Circuit {
    pub fn num_qubits(&self) -> usize {
        self.qubits.iter().map(|r| r.size).sum()
    }

    pub fn num_bits(&self) -> usize {
        self.bits.iter().map(|r| r.size).sum()
    }

    pub fn qubit_register(&self, name: &str) -> Option<&Register> {
        self.qubits.iter().find(|r| r.name == name)
    }

    pub fn bit_register(&self, name: &str) -> Option<&Register> {
        self.bits.iter().find(|r| r.name == name)
    }
}

/// Parse `code` into a [`Circuit`].
pub(crate) fn parse(code: &str) -> EngineResult<Circuit> {
    let mut parser = Parser::default();
    for statement in split(code)? {
        let kind = parser.classify(&statement)?;
        parser.circuit.instructions.push(Instruction {
            span: Span {
                start: statement.start,
                end: statement.end,
            },
            kind,
        });
    }
    if let Some(open) = parser.open_definition {
        let start = parser.circuit.instructions[open.header].span.start;
        return Err(parse_error(start, "gate definition is missing its closing `}`"));
    }
    Ok(parser.circuit)
}

fn parse_error(position: usize, message: impl Into<String>) -> EngineError {
    EngineError::Parse {
        position,
        message: message.into(),
    }
}

/// One raw statement and the byte that ended it.
#[derive(Debug, PartialEq, Eq)]
struct Statement<'a> {
    start: usize,
    end: usize,
    text: &'a str,
    terminator: u8,
}

/// Split source at `;`, `{` and `}`, skipping `//` comments.
fn split(code: &str) -> EngineResult<Vec<Statement<'_>>> {
    let bytes = code.as_bytes();
    let mut statements = Vec::new();
    let mut start: Option<usize> = None;
    let mut i = 0;

    while i < bytes.len() {
        let b = bytes[i];
        if b == b'/' && bytes.get(i + 1) == Some(&b'/') {
            while i < bytes.len() && bytes[i] != b'\n' {
                i += 1;
            }
            continue;
        }
        match b {
            b';' | b'{' | b'}' => {
                if b == b'}' {
                    if let Some(pending) = start {
                        return Err(parse_error(pending, "missing `;` before `}`"));
                    }
                }
                let from = start.unwrap_or(i);
                let text = code[from..i].trim();
                if !(b == b';' && text.is_empty()) {
                    statements.push(Statement {
                        start: from,
                        end: i,
                        text,
                        terminator: b,
                    });
                }
                start = None;
            }
            _ if start.is_none() && !b.is_ascii_whitespace() => start = Some(i),
            _ => {}
        }
        i += 1;
    }

    match start {
        Some(pending) => Err(parse_error(pending, "statement is missing its `;`")),
        None => Ok(statements),
    }
}

struct OpenDefinition {
    header: usize,
    formals: Vec<String>,
}

#[derive(Default)]
struct Parser {
    circuit: Circuit,
    /// Gate name to the index of its definition header.
    definitions: HashMap<String, usize>,
    open_definition: Option<OpenDefinition>,
}

impl Parser {
    fn classify(&mut self, statement: &Statement<'_>) -> EngineResult<Kind> {
        let at = statement.start;
        match statement.terminator {
            b'{' => self.definition(statement),
            b'}' => {
                let open = self
                    .open_definition
                    .take()
                    .ok_or_else(|| parse_error(at, "`}` without a gate definition"))?;
                let end = self.circuit.instructions.len();
                if let Some(header) = self.circuit.instructions.get_mut(open.header) {
                    if let Kind::Definition { end: slot, .. } = &mut header.kind {
                        *slot = end;
                    }
                }
                Ok(Kind::Return)
            }
            _ => self.statement(statement.text, at),
        }
    }

    fn definition(&mut self, statement: &Statement<'_>) -> EngineResult<Kind> {
        let at = statement.start;
        if self.open_definition.is_some() {
            return Err(parse_error(at, "gate definitions cannot be nested"));
        }
        let rest = statement
            .text
            .strip_prefix("gate")
            .filter(|rest| rest.starts_with(char::is_whitespace))
            .ok_or_else(|| parse_error(at, "`{` may only open a gate definition"))?
            .trim();
        let (name, formals) = rest.split_once(char::is_whitespace).unwrap_or((rest, ""));
        if name.contains('(') {
            return Err(parse_error(at, "parameterized gate definitions are not supported"));
        }
        if !is_identifier(name) {
            return Err(parse_error(at, format!("invalid gate name `{name}`")));
        }
        let formals: Vec<String> = formals
            .split(',')
            .map(str::trim)
            .filter(|f| !f.is_empty())
            .map(str::to_string)
            .collect();
        if formals.is_empty() {
            return Err(parse_error(at, format!("gate `{name}` takes no qubits")));
        }
        if let Some(bad) = formals.iter().find(|f| !is_identifier(f)) {
            return Err(parse_error(at, format!("invalid gate argument `{bad}`")));
        }

        let header = self.circuit.instructions.len();
        self.definitions.insert(name.to_string(), header);
        self.open_definition = Some(OpenDefinition {
            header,
            formals: formals.clone(),
        });
        Ok(Kind::Definition { formals, end: header })
    }

    fn statement(&mut self, text: &str, at: usize) -> EngineResult<Kind> {
        let (keyword, rest) = split_keyword(text);
        match keyword {
            "OPENQASM" | "include" if self.open_definition.is_none() => Ok(Kind::Nop),
            "qreg" | "creg" => self.declaration(keyword, rest, at),
            "barrier" => {
                self.operands(rest, at)?;
                Ok(Kind::Nop)
            }
            "measure" => {
                let (qubits, bits) = rest
                    .split_once("->")
                    .ok_or_else(|| parse_error(at, "expected `measure <qubits> -> <bits>`"))?;
                let qubits = self.qubit_operand(qubits.trim(), at)?;
                let bits = self.bit_operand(bits.trim(), at)?;
                let bit_width = match (bits.index, self.circuit.bit_register(&bits.register)) {
                    (None, Some(register)) => register.size,
                    _ => 1,
                };
                if self.width(&qubits) != bit_width {
                    return Err(parse_error(at, "measured qubits and target bits differ in size"));
                }
                Ok(Kind::Measure { qubits, bits })
            }
            "reset" => Ok(Kind::Reset(self.qubit_operand(rest.trim(), at)?)),
            "assert-ent" => self.assertion(AssertionKind::Entanglement, rest, at),
            "assert-sup" => self.assertion(AssertionKind::Superposition, rest, at),
            "if" => Err(parse_error(at, "classically controlled operations are not supported")),
            _ => self.application(text, at),
        }
    }

    fn declaration(&mut self, keyword: &str, rest: &str, at: usize) -> EngineResult<Kind> {
        if self.open_definition.is_some() {
            return Err(parse_error(at, "registers cannot be declared inside a gate"));
        }
        let operand = parse_operand(rest.trim(), at)?;
        let size = operand
            .index
            .filter(|&size| size > 0)
            .ok_or_else(|| parse_error(at, format!("`{keyword}` needs a positive size")))?;
        let name = operand.register;
        if self.circuit.qubit_register(&name).is_some() || self.circuit.bit_register(&name).is_some() {
            return Err(parse_error(at, format!("register `{name}` is already declared")));
        }

        if keyword == "qreg" {
            let start = self.circuit.num_qubits();
            if start + size > MAX_QUBITS {
                return Err(parse_error(at, format!("at most {MAX_QUBITS} qubits are supported")));
            }
            self.circuit.qubits.push(Register { name, start, size });
        } else {
            let start = self.circuit.num_bits();
            self.circuit.bits.push(Register { name, start, size });
        }
        Ok(Kind::Nop)
    }

    fn assertion(&self, kind: AssertionKind, rest: &str, at: usize) -> EngineResult<Kind> {
        let targets = self.operands(rest, at)?;
        let count: usize = targets
            .iter()
            .map(|t| self.width(t))
            .sum();
        let needed = match kind {
            AssertionKind::Entanglement => 2,
            AssertionKind::Superposition => 1,
        };
        if count < needed {
            return Err(parse_error(at, format!("assertion needs at least {needed} qubit(s)")));
        }
        Ok(Kind::Assert { kind, targets })
    }

    /// A builtin gate or a call to a defined gate.
    fn application(&self, text: &str, at: usize) -> EngineResult<Kind> {
        let (head, rest) = split_application(text, at)?;
        let (name, params) = match head.split_once('(') {
            Some((name, params)) => {
                let params = params
                    .strip_suffix(')')
                    .ok_or_else(|| parse_error(at, "unclosed parameter list"))?;
                (name.trim(), Some(params))
            }
            None => (head, None),
        };
        let operands = self.operands(rest, at)?;

        if let Some(&definition) = self.definitions.get(name) {
            if params.is_some() {
                return Err(parse_error(at, format!("gate `{name}` takes no parameters")));
            }
            let arity = match &self.circuit.instructions[definition].kind {
                Kind::Definition { formals, .. } => formals.len(),
                _ => 0,
            };
            if self.open_definition.as_ref().map(|d| d.header) == Some(definition) {
                return Err(parse_error(at, format!("gate `{name}` cannot call itself")));
            }
            self.check_arity(name, arity, &operands, at)?;
            return Ok(Kind::Call {
                definition,
                arguments: operands,
            });
        }

        let values = match params {
            Some(params) => params
                .split(',')
                .map(|p| evaluate(p, at))
                .collect::<EngineResult<Vec<_>>>()?,
            None => Vec::new(),
        };
        if name == "swap" {
            expect_params(name, &values, 0, at)?;
            self.check_arity(name, 2, &operands, at)?;
            return Ok(Kind::Swap { operands });
        }
        let (matrix, controls) = builtin(name, &values, at)?;
        self.check_arity(name, controls + 1, &operands, at)?;
        Ok(Kind::Gate { matrix, operands })
    }

    fn check_arity(&self, name: &str, arity: usize, operands: &[Operand], at: usize) -> EngineResult<()> {
        if operands.len() != arity {
            return Err(parse_error(
                at,
                format!("gate `{name}` takes {arity} qubit argument(s), got {}", operands.len()),
            ));
        }
        // Registers broadcast; their sizes must agree.
        let mut width = 1;
        for operand in operands {
            let w = self.width(operand);
            if w != 1 && width != 1 && w != width {
                return Err(parse_error(at, "register arguments differ in size"));
            }
            width = width.max(w);
        }
        Ok(())
    }

    /// Number of qubits an operand stands for.
    fn width(&self, operand: &Operand) -> usize {
        match (operand.index, self.circuit.qubit_register(&operand.register)) {
            (None, Some(register)) if self.open_definition.is_none() => register.size,
            _ => 1,
        }
    }

    fn operands(&self, text: &str, at: usize) -> EngineResult<Vec<Operand>> {
        text.split(',')
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(|t| self.qubit_operand(t, at))
            .collect()
    }

    fn qubit_operand(&self, text: &str, at: usize) -> EngineResult<Operand> {
        let operand = parse_operand(text, at)?;
        if let Some(open) = &self.open_definition {
            if operand.index.is_some() || !open.formals.contains(&operand.register) {
                return Err(parse_error(
                    at,
                    format!("`{text}` is not an argument of the enclosing gate"),
                ));
            }
            return Ok(operand);
        }
        let register = self
            .circuit
            .qubit_register(&operand.register)
            .ok_or_else(|| parse_error(at, format!("unknown quantum register `{}`", operand.register)))?;
        check_index(&operand, register, at)?;
        Ok(operand)
    }

    fn bit_operand(&self, text: &str, at: usize) -> EngineResult<Operand> {
        if self.open_definition.is_some() {
            return Err(parse_error(at, "gates cannot measure into classical bits"));
        }
        let operand = parse_operand(text, at)?;
        let register = self
            .circuit
            .bit_register(&operand.register)
            .ok_or_else(|| parse_error(at, format!("unknown classical register `{}`", operand.register)))?;
        check_index(&operand, register, at)?;
        Ok(operand)
    }
}

fn check_index(operand: &Operand, register: &Register, at: usize) -> EngineResult<()> {
    match operand.index {
        Some(index) if index >= register.size => Err(parse_error(
            at,
            format!("index {index} is out of range for `{}[{}]`", register.name, register.size),
        )),
        _ => Ok(()),
    }
}

fn is_identifier(text: &str) -> bool {
    let mut chars = text.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// First word (letters, digits, `-`, `_`) and the remainder.
fn split_keyword(text: &str) -> (&str, &str) {
    let end = text
        .find(|c: char| !(c.is_ascii_alphanumeric() || c == '-' || c == '_'))
        .unwrap_or(text.len());
    (&text[..end], &text[end..])
}

/// `name(params)` and the operand list that follows it.
fn split_application(text: &str, at: usize) -> EngineResult<(&str, &str)> {
    let (keyword, _) = split_keyword(text);
    if !is_identifier(keyword) {
        return Err(parse_error(at, format!("unrecognized statement `{text}`")));
    }
    let after_name = &text[keyword.len()..];
    let head_len = if after_name.trim_start().starts_with('(') {
        let mut depth = 0usize;
        let close = text
            .char_indices()
            .find(|&(_, c)| {
                match c {
                    '(' => depth += 1,
                    ')' => depth = depth.saturating_sub(1),
                    _ => return false,
                }
                c == ')' && depth == 0
            })
            .map(|(i, _)| i)
            .ok_or_else(|| parse_error(at, "unclosed parameter list"))?;
        close + 1
    } else {
        keyword.len()
    };
    Ok((text[..head_len].trim(), &text[head_len..]))
}

fn parse_operand(text: &str, at: usize) -> EngineResult<Operand> {
    let invalid = || parse_error(at, format!("invalid operand `{text}`"));
    let (register, index) = match text.split_once('[') {
        Some((name, index)) => {
            let index = index
                .strip_suffix(']')
                .and_then(|i| i.trim().parse::<usize>().ok())
                .ok_or_else(invalid)?;
            (name.trim(), Some(index))
        }
        None => (text, None),
    };
    if !is_identifier(register) {
        return Err(invalid());
    }
    Ok(Operand {
        register: register.to_string(),
        index,
    })
}

fn expect_params(name: &str, values: &[f64], count: usize, at: usize) -> EngineResult<()> {
    if values.len() == count {
        Ok(())
    } else {
        Err(parse_error(
            at,
            format!("gate `{name}` takes {count} parameter(s), got {}", values.len()),
        ))
    }
}

/// Matrix and number of control qubits of a builtin gate.
fn builtin(name: &str, values: &[f64], at: usize) -> EngineResult<(Matrix, usize)> {
    let fixed = |matrix: Matrix, controls: usize| -> EngineResult<(Matrix, usize)> {
        expect_params(name, values, 0, at)?;
        Ok((matrix, controls))
    };
    let param = |index: usize| values.get(index).copied().unwrap_or_default();
    let pi = std::f64::consts::PI;
    match name {
        "id" => fixed(gates::ID, 0),
        "x" => fixed(gates::X, 0),
        "y" => fixed(gates::Y, 0),
        "z" => fixed(gates::Z, 0),
        "h" => fixed(gates::H, 0),
        "s" => fixed(gates::phase(pi / 2.0), 0),
        "sdg" => fixed(gates::phase(-pi / 2.0), 0),
        "t" => fixed(gates::phase(pi / 4.0), 0),
        "tdg" => fixed(gates::phase(-pi / 4.0), 0),
        "cx" | "CX" => fixed(gates::X, 1),
        "cy" => fixed(gates::Y, 1),
        "cz" => fixed(gates::Z, 1),
        "ch" => fixed(gates::H, 1),
        "ccx" => fixed(gates::X, 2),
        "rx" | "ry" | "rz" | "p" | "u1" | "cp" | "cu1" | "crz" => {
            expect_params(name, values, 1, at)?;
            let matrix = match name {
                "rx" => gates::rx(param(0)),
                "ry" => gates::ry(param(0)),
                "rz" | "crz" => gates::rz(param(0)),
                _ => gates::phase(param(0)),
            };
            Ok((matrix, usize::from(name.starts_with('c'))))
        }
        "u2" => {
            expect_params(name, values, 2, at)?;
            Ok((gates::u3(pi / 2.0, param(0), param(1)), 0))
        }
        "u3" | "u" | "U" => {
            expect_params(name, values, 3, at)?;
            Ok((gates::u3(param(0), param(1), param(2)), 0))
        }
        _ => Err(parse_error(at, format!("unknown gate `{name}`"))),
    }
}

/// Evaluate a parameter expression built from numbers, `pi`, `+ - * /` and
/// parentheses.
fn evaluate(text: &str, at: usize) -> EngineResult<f64> {
    let mut expr = Expr {
        chars: text.chars().filter(|c| !c.is_whitespace()).collect(),
        pos: 0,
    };
    let value = expr.sum();
    match value {
        Some(v) if expr.pos == expr.chars.len() && v.is_finite() => Ok(v),
        _ => Err(parse_error(at, format!("invalid parameter `{}`", text.trim()))),
    }
}

struct Expr {
    chars: Vec<char>,
    pos: usize,
}

impl Expr {
    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn sum(&mut self) -> Option<f64> {
        let mut value = self.product()?;
        while let Some(op @ ('+' | '-')) = self.peek() {
            self.pos += 1;
            let rhs = self.product()?;
            value = if op == '+' { value + rhs } else { value - rhs };
        }
        Some(value)
    }

    fn product(&mut self) -> Option<f64> {
        let mut value = self.factor()?;
        while let Some(op @ ('*' | '/')) = self.peek() {
            self.pos += 1;
            let rhs = self.factor()?;
            value = if op == '*' { value * rhs } else { value / rhs };
        }
        Some(value)
    }

    fn factor(&mut self) -> Option<f64> {
        match self.peek()? {
            '-' => {
                self.pos += 1;
                self.factor().map(|v| -v)
            }
            '(' => {
                self.pos += 1;
                let value = self.sum()?;
                (self.peek()? == ')').then(|| self.pos += 1)?;
                Some(value)
            }
            'p' => {
                let word: String = self.chars[self.pos..].iter().take(2).collect();
                (word == "pi").then(|| self.pos += 2)?;
                Some(std::f64::consts::PI)
            }
            _ => {
                let start = self.pos;
                while matches!(self.peek(), Some(c) if c.is_ascii_digit() || c == '.') {
                    self.pos += 1;
                }
                let literal: String = self.chars[start..self.pos].iter().collect();
                literal.parse().ok()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BELL: &str = "OPENQASM 2.0;\ninclude \"qelib1.inc\";\nqreg q[2];\ncreg c[2];\nh q[0];\ncx q[0], q[1];\nmeasure q -> c;\n";

    fn kinds(code: &str) -> Vec<Kind> {
        parse(code).unwrap().instructions.into_iter().map(|i| i.kind).collect()
    }

    fn error(code: &str) -> String {
        parse(code).unwrap_err().to_string()
    }

    #[test]
    fn parses_a_bell_circuit() {
        let circuit = parse(BELL).unwrap();
        assert_eq!(circuit.instructions.len(), 7);
        assert_eq!(circuit.num_qubits(), 2);
        assert_eq!(circuit.num_bits(), 2);
        let span = circuit.instructions[5].span;
        assert_eq!(&BELL[span.start..=span.end], "cx q[0], q[1];");
        assert!(matches!(circuit.instructions[6].kind, Kind::Measure { .. }));
    }

    #[test]
    fn gate_definitions_become_header_body_and_return() {
        let code = "qreg q[2];\ngate bell a, b {\n  h a;\n  cx a, b;\n}\nbell q[0], q[1];\n";
        let circuit = parse(code).unwrap();
        let kinds: Vec<_> = circuit.instructions.iter().map(|i| &i.kind).collect();
        assert_eq!(
            kinds[1],
            &Kind::Definition {
                formals: vec!["a".into(), "b".into()],
                end: 4
            }
        );
        assert!(matches!(kinds[2], Kind::Gate { .. }));
        assert_eq!(kinds[4], &Kind::Return);
        assert!(matches!(kinds[5], Kind::Call { definition: 1, .. }));

        let header = circuit.instructions[1].span;
        assert_eq!(&code[header.start..header.end], "gate bell a, b ");
        assert_eq!(&code[circuit.instructions[4].span.start..=circuit.instructions[4].span.end], "}");
    }

    #[test]
    fn assertions_and_parameters() {
        let kinds = kinds("qreg q[3];\nrz(-pi/2) q[1];\nu3(pi, 0, 2*(pi-1)) q[0];\nassert-ent q[0], q[1];\nassert-sup q;\n");
        assert!(matches!(
            kinds[3],
            Kind::Assert {
                kind: AssertionKind::Entanglement,
                ..
            }
        ));
        assert!(matches!(
            kinds[4],
            Kind::Assert {
                kind: AssertionKind::Superposition,
                ..
            }
        ));
        assert!((evaluate("-pi/2", 0).unwrap() + std::f64::consts::FRAC_PI_2).abs() < 1e-12);
        assert!((evaluate(" 2 * (1.5 - 0.5) ", 0).unwrap() - 2.0).abs() < 1e-12);
    }

    #[test]
    fn comments_and_stray_semicolons_are_skipped() {
        let kinds = kinds("// header\nqreg q[1];;\nx q[0]; // flip\n");
        assert_eq!(kinds.len(), 2);
    }

    #[test]
    fn rejects_bad_programs() {
        assert!(error("h q[0];").contains("unknown quantum register `q`"));
        assert!(error("qreg q[1];\nfoo q[0];").contains("unknown gate `foo`"));
        assert!(error("qreg q[1];\nh q[3];").contains("out of range"));
        assert!(error("qreg q[2];\ncx q[0];").contains("takes 2 qubit argument(s)"));
        assert!(error("qreg q[1];\nrz q[0];").contains("takes 1 parameter(s)"));
        assert!(error("qreg q[1];\nh q[0]").contains("missing its `;`"));
        assert!(error("qreg q[1];\ngate g a { h a;").contains("closing `}`"));
        assert!(error("qreg q[1];\ngate g a { h b; }").contains("not an argument"));
        assert!(error("qreg q[20];").contains("at most 16 qubits"));
        assert!(error("qreg q[1];\nassert-ent q[0];").contains("at least 2"));
        assert!(error("qreg q[1];\n}").contains("without a gate definition"));
        assert!(error("qreg q[2];\ncreg c[1];\nmeasure q -> c;").contains("differ in size"));

        match parse("qreg q[1];\nfoo q[0];").unwrap_err() {
            EngineError::Parse { position, .. } => assert_eq!(position, 11),
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn registers_broadcast_only_when_sizes_agree() {
        assert!(parse("qreg a[2];\nqreg b[2];\ncx a, b;").is_ok());
        assert!(parse("qreg a[2];\nqreg b[2];\ncx a[0], b;").is_ok());
        assert!(error("qreg a[2];\nqreg b[3];\ncx a, b;").contains("differ in size"));
    }
}
