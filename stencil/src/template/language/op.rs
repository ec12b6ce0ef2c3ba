use super::super::lexer::{Token, Value};
use super::super::Error;

use serde::{Deserialize, Serialize};

use std::cmp::Ordering;

/// Unary and binary operators.
#[derive(Clone, Copy, PartialEq, Debug, Serialize, Deserialize)]
pub enum Op {
    Not,
    And,
    Or,
    Add,
    Sub,
    Mult,
    Div,
    Mod,
    Equals,
    NotEquals,
    GreaterThan,
    GreaterEqualThan,
    LessThan,
    LessEqualThan,
}

impl Op {
    pub fn from_token(token: Token) -> Option<Self> {
        let op = match token {
            Token::Not => Op::Not,
            Token::And => Op::And,
            Token::Or => Op::Or,
            Token::Plus => Op::Add,
            Token::Minus => Op::Sub,
            Token::Mult => Op::Mult,
            Token::Div => Op::Div,
            Token::Mod => Op::Mod,
            Token::Equals => Op::Equals,
            Token::NotEquals => Op::NotEquals,
            Token::GreaterThan => Op::GreaterThan,
            Token::GreaterEqualThan => Op::GreaterEqualThan,
            Token::LessThan => Op::LessThan,
            Token::LessEqualThan => Op::LessEqualThan,
            _ => return None,
        };

        Some(op)
    }

    /// `!` only takes one operand.
    pub fn binary(&self) -> bool {
        *self != Op::Not
    }

    pub fn evaluate_unary(&self, value: &Value) -> Result<Value, Error> {
        Ok(match (self, value) {
            (Op::Not, value) => Value::Boolean(!value.truthy()),
            (Op::Sub, Value::Integer(n)) => {
                Value::Integer(n.checked_neg().ok_or(Error::Overflow("-"))?)
            }
            (Op::Sub, Value::Float(n)) => Value::Float(-n),
            (Op::Add, value @ (Value::Integer(_) | Value::Float(_))) => value.clone(),
            _ => Value::Null,
        })
    }

    pub fn evaluate_binary(&self, left: &Value, right: &Value) -> Result<Value, Error> {
        if let Some(ordering) = self.comparison() {
            return Ok(Value::Boolean(ordering(left.partial_cmp(right))));
        }

        match self {
            Op::Equals => Ok(Value::Boolean(left == right)),
            Op::NotEquals => Ok(Value::Boolean(left != right)),
            Op::And => Ok(Value::Boolean(left.truthy() && right.truthy())),
            Op::Or => Ok(Value::Boolean(left.truthy() || right.truthy())),
            Op::Add => Ok(left.add(right)),
            Op::Sub => Ok(left.sub(right)),
            Op::Mult => Ok(left.mul(right)),
            Op::Div => left.div(right),
            Op::Mod => left.rem(right),
            _ => self.evaluate_unary(right),
        }
    }

    // Ordering operators, as a test on how the operands compare.
    // Values without an ordering, e.g. lists, never pass.
    fn comparison(&self) -> Option<fn(Option<Ordering>) -> bool> {
        use Ordering::*;

        let test: fn(Option<Ordering>) -> bool = match self {
            Op::LessThan => |o| o == Some(Less),
            Op::LessEqualThan => |o| matches!(o, Some(Less | Equal)),
            Op::GreaterThan => |o| o == Some(Greater),
            Op::GreaterEqualThan => |o| matches!(o, Some(Greater | Equal)),
            _ => return None,
        };

        Some(test)
    }

    /// Binding strength, lower binds tighter.
    pub fn precedence(&self) -> u8 {
        match self {
            Op::Not => 1,
            Op::Mult | Op::Div | Op::Mod => 2,
            Op::Add | Op::Sub => 3,
            Op::LessThan | Op::LessEqualThan | Op::GreaterThan | Op::GreaterEqualThan => 4,
            Op::Equals | Op::NotEquals => 5,
            Op::And => 6,
            Op::Or => 7,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_comparison() -> Result<(), Error> {
        let (one, two) = (Value::Integer(1), Value::Integer(2));

        assert_eq!(Op::LessThan.evaluate_binary(&one, &two)?, Value::Boolean(true));
        assert_eq!(Op::GreaterEqualThan.evaluate_binary(&one, &one)?, Value::Boolean(true));
        assert_eq!(Op::NotEquals.evaluate_binary(&one, &two)?, Value::Boolean(true));
        assert_eq!(Op::Equals.evaluate_binary(&one, &two)?, Value::Boolean(false));
        assert_eq!(Op::Equals.evaluate_binary(&Value::Null, &Value::Null)?, Value::Boolean(true));
        assert_eq!(Op::LessThan.evaluate_binary(&Value::Null, &one)?, Value::Boolean(false));

        Ok(())
    }

    #[test]
    fn test_integer_overflow() {
        let (min, minus_one) = (Value::Integer(i64::MIN), Value::Integer(-1));

        assert!(matches!(Op::Div.evaluate_binary(&min, &minus_one), Err(Error::Overflow("/"))));
        assert!(matches!(Op::Mod.evaluate_binary(&min, &minus_one), Err(Error::Overflow("%"))));
        assert!(matches!(min.call("abs", &[]), Err(Error::Overflow("abs"))));
    }

    #[test]
    fn test_unary() -> Result<(), Error> {
        assert_eq!(Op::Sub.evaluate_unary(&Value::Float(1.5))?, Value::Float(-1.5));
        assert_eq!(Op::Not.evaluate_unary(&Value::Null)?, Value::Boolean(true));
        assert_eq!(Op::Add.evaluate_unary(&Value::String("a".into()))?, Value::Null);
        assert!(matches!(
            Op::Sub.evaluate_unary(&Value::Integer(i64::MIN)),
            Err(Error::Overflow("-"))
        ));

        Ok(())
    }
}
