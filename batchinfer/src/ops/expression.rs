//! `pnnx.Expression`: elementwise arithmetic over the node's inputs.
//!
//! Expressions are prefix calls such as `add(@0,mul(@1,@2))`; `@i` names the
//! `i`-th input operand.
use crate::graph::OperatorNode;
use crate::layer::params::str_param;
use crate::layer::{InferError, Layer, ParseError};
use crate::ops::common::{check_batch, ensure_output, for_each_sample};
use crate::tensor::Tensor;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BinaryOp {
    Add,
    Sub,
    Mul,
}

impl BinaryOp {
    fn apply(self, a: f32, b: f32) -> f32 {
        match self {
            BinaryOp::Add => a + b,
            BinaryOp::Sub => a - b,
            BinaryOp::Mul => a * b,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Expr {
    Input(usize),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
}

impl Expr {
    fn max_input(&self) -> usize {
        match self {
            Expr::Input(index) => *index,
            Expr::Binary(_, lhs, rhs) => lhs.max_input().max(rhs.max_input()),
        }
    }
}

struct Parser<'a> {
    text: &'a str,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn parse(text: &'a str) -> Result<Expr, String> {
        let mut parser = Parser { text, pos: 0 };
        let expr = parser.expr()?;
        parser.skip_ws();
        if parser.pos != text.len() {
            return Err(format!("unexpected trailing input at {}", parser.pos));
        }
        Ok(expr)
    }

    fn skip_ws(&mut self) {
        let rest = self.rest();
        self.pos += rest.len() - rest.trim_start().len();
    }

    fn rest(&self) -> &'a str {
        &self.text[self.pos..]
    }

    fn expect(&mut self, token: char) -> Result<(), String> {
        self.skip_ws();
        if self.rest().starts_with(token) {
            self.pos += token.len_utf8();
            Ok(())
        } else {
            Err(format!("expected '{}' at {}", token, self.pos))
        }
    }

    fn take_while(&mut self, pred: impl Fn(char) -> bool) -> &'a str {
        let start = self.pos;
        let len = self
            .rest()
            .find(|c: char| !pred(c))
            .unwrap_or(self.rest().len());
        self.pos += len;
        &self.text[start..start + len]
    }

    fn expr(&mut self) -> Result<Expr, String> {
        self.skip_ws();
        if self.rest().starts_with('@') {
            self.pos += 1;
            let digits = self.take_while(|c| c.is_ascii_digit());
            return digits
                .parse::<usize>()
                .map(Expr::Input)
                .map_err(|_| format!("invalid input reference at {}", self.pos));
        }
        let name = self.take_while(|c| c.is_ascii_alphanumeric() || c == '_');
        let op = match name {
            "add" => BinaryOp::Add,
            "sub" => BinaryOp::Sub,
            "mul" => BinaryOp::Mul,
            "" => return Err(format!("expected an operand at {}", self.pos)),
            other => return Err(format!("unsupported operator {}", other)),
        };
        self.expect('(')?;
        let lhs = self.expr()?;
        self.expect(',')?;
        let rhs = self.expr()?;
        self.expect(')')?;
        Ok(Expr::Binary(op, Box::new(lhs), Box::new(rhs)))
    }
}

/// Combine two tensors of equal shape, or broadcast a per-channel `(c, 1, 1)`
/// or single-element operand.
fn broadcast(op: BinaryOp, a: &Tensor<f32>, b: &Tensor<f32>) -> Option<Tensor<f32>> {
    if a.shapes() == b.shapes() {
        let mut out = a.clone();
        for (slot, rhs) in out.data_mut().iter_mut().zip(b.data()) {
            *slot = op.apply(*slot, *rhs);
        }
        return Some(out);
    }
    let (big, small, swapped) = if a.size() >= b.size() { (a, b, false) } else { (b, a, true) };
    let plane = big.rows() * big.cols();
    let per_channel = small.channels() == big.channels() && small.rows() * small.cols() == 1;
    if small.size() != 1 && !per_channel {
        return None;
    }
    let mut out = big.clone();
    for (offset, slot) in out.data_mut().iter_mut().enumerate() {
        let s = if small.size() == 1 { small.index(0) } else { small.index(offset / plane) };
        *slot = if swapped { op.apply(s, *slot) } else { op.apply(*slot, s) };
    }
    Some(out)
}

pub(crate) struct ExpressionLayer {
    expr: Expr,
}

impl ExpressionLayer {
    pub(crate) fn new(expr: &str) -> Result<Self, ParseError> {
        let expr = Parser::parse(expr).map_err(|reason| ParseError::invalid("expr", reason))?;
        Ok(Self { expr })
    }

    pub(crate) fn create(node: &OperatorNode) -> Result<Box<dyn Layer>, ParseError> {
        let text = str_param(node, "expr").ok_or(ParseError::MissingExpr)?;
        let layer = Self::new(text)?;
        let arity = node.input_names().len();
        if layer.expr.max_input() >= arity {
            return Err(ParseError::invalid(
                "expr",
                format!(
                    "expression references @{} but the node has {} inputs",
                    layer.expr.max_input(),
                    arity
                ),
            ));
        }
        Ok(Box::new(layer))
    }

    fn eval(
        &self,
        expr: &Expr,
        inputs: &[&[Tensor<f32>]],
        index: usize,
    ) -> Result<Tensor<f32>, InferError> {
        match expr {
            Expr::Input(operand) => inputs
                .get(*operand)
                .map(|batch| batch[index].clone())
                .ok_or_else(|| InferError::InputShapeMismatch {
                    layer: self.layer_name().to_string(),
                    index: *operand,
                }),
            Expr::Binary(op, lhs, rhs) => {
                let a = self.eval(lhs, inputs, index)?;
                let b = self.eval(rhs, inputs, index)?;
                broadcast(*op, &a, &b).ok_or_else(|| InferError::InputShapeMismatch {
                    layer: self.layer_name().to_string(),
                    index,
                })
            }
        }
    }
}

impl Layer for ExpressionLayer {
    fn layer_name(&self) -> &str {
        "Expression"
    }

    fn forward(
        &self,
        inputs: &[&[Tensor<f32>]],
        outputs: &mut [Tensor<f32>],
    ) -> Result<(), InferError> {
        check_batch(self.layer_name(), inputs, outputs, None)?;
        for_each_sample(outputs, |index, output| {
            let result = self.eval(&self.expr, inputs, index)?;
            if output.is_empty() {
                *output = result;
                return Ok(());
            }
            ensure_output(self.layer_name(), output, index, result.shapes())?;
            output.data_mut().copy_from_slice(result.data());
            Ok(())
        })
    }
}
