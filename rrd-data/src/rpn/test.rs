use std::collections::HashMap;

use super::{ExpressionError, RpnCalculator, RpnExpression};

fn eval(expression: &str) -> Result<f64, ExpressionError> {
    RpnCalculator::new(RpnExpression::parse(expression)).calculate(&HashMap::new(), 0.0)
}

fn eval_at(expression: &str, timestamp: f64) -> Result<f64, ExpressionError> {
    RpnCalculator::new(RpnExpression::parse(expression)).calculate(&HashMap::new(), timestamp)
}

#[test]
fn arithmetic() {
    assert_eq!(eval("2,3,+").unwrap(), 5.0);
    // The second popped value is the left operand.
    assert_eq!(eval("5,2,-").unwrap(), 3.0);
    assert_eq!(eval("6,4,*").unwrap(), 24.0);
    assert_eq!(eval("7,2,/").unwrap(), 3.5);
    assert_eq!(eval("7,2,%").unwrap(), 1.0);
    assert_eq!(eval("2,10,POW").unwrap(), 1024.0);
    assert_eq!(eval("9,SQRT").unwrap(), 3.0);
    assert_eq!(eval("-3,ABS").unwrap(), 3.0);
}

#[test]
fn rounding() {
    assert_eq!(eval("2.7,FLOOR").unwrap(), 2.0);
    assert_eq!(eval("2.2,CEIL").unwrap(), 3.0);
    assert_eq!(eval("2.5,ROUND").unwrap(), 3.0);
    // Halves round up, not away from zero.
    assert_eq!(eval("-2.5,ROUND").unwrap(), -2.0);
}

#[test]
fn transcendentals() {
    assert_eq!(eval("1,EXP").unwrap(), std::f64::consts::E);
    assert_eq!(eval("E,LOG").unwrap(), 1.0);
    assert_eq!(eval("0,SIN").unwrap(), 0.0);
    assert_eq!(eval("0,COS").unwrap(), 1.0);
    assert_eq!(eval("PI,2,*").unwrap(), std::f64::consts::TAU);
}

#[test]
fn comparisons() {
    assert_eq!(eval("1,2,LT").unwrap(), 1.0);
    assert_eq!(eval("2,2,LT").unwrap(), 0.0);
    assert_eq!(eval("2,2,LE").unwrap(), 1.0);
    assert_eq!(eval("3,2,GT").unwrap(), 1.0);
    assert_eq!(eval("2,3,GE").unwrap(), 0.0);
    assert_eq!(eval("2,2,EQ").unwrap(), 1.0);
    // NaN never compares true.
    assert_eq!(eval("UNKN,1,LT").unwrap(), 0.0);
}

#[test]
fn conditional() {
    // Condition is the first pushed operand.
    assert_eq!(eval("1,2,3,IF").unwrap(), 2.0);
    assert_eq!(eval("0,2,3,IF").unwrap(), 3.0);
    // NaN is truthy: it compares != 0.
    assert_eq!(eval("UNKN,2,3,IF").unwrap(), 2.0);
}

#[test]
fn min_max_limit() {
    assert_eq!(eval("2,7,MIN").unwrap(), 2.0);
    assert_eq!(eval("2,7,MAX").unwrap(), 7.0);
    // MIN and MAX propagate NaN.
    assert!(eval("2,UNKN,MIN").unwrap().is_nan());
    assert!(eval("UNKN,7,MAX").unwrap().is_nan());

    assert_eq!(eval("5,0,10,LIMIT").unwrap(), 5.0);
    assert!(eval("15,0,10,LIMIT").unwrap().is_nan());
    assert!(eval("-1,0,10,LIMIT").unwrap().is_nan());
}

#[test]
fn stack_manipulation() {
    assert_eq!(eval("3,DUP,*").unwrap(), 9.0);
    assert_eq!(eval("2,8,EXC,/").unwrap(), 4.0);
    assert_eq!(eval("1,2,POP").unwrap(), 1.0);
}

#[test]
fn unknown_handling() {
    assert_eq!(eval("UNKN,UN").unwrap(), 1.0);
    assert_eq!(eval("1,UN").unwrap(), 0.0);
    assert!(eval("UNKN").unwrap().is_nan());
}

#[test]
fn logic() {
    assert_eq!(eval("1,1,AND").unwrap(), 1.0);
    assert_eq!(eval("1,0,AND").unwrap(), 0.0);
    assert_eq!(eval("1,0,OR").unwrap(), 1.0);
    assert_eq!(eval("0,0,OR").unwrap(), 0.0);
    assert_eq!(eval("1,0,XOR").unwrap(), 1.0);
    assert_eq!(eval("1,1,XOR").unwrap(), 0.0);
}

#[test]
fn time_token() {
    assert_eq!(eval_at("TIME", 1234.0).unwrap(), 1234.0);
    assert_eq!(eval_at("TIME,60,+", 1234.0).unwrap(), 1294.0);
}

#[test]
fn random_range() {
    for _ in 0..32 {
        let value = eval("RANDOM").unwrap();
        assert!((0.0..1.0).contains(&value));
    }
}

#[test]
fn whitespace_delimiters() {
    assert_eq!(eval("2 3 +").unwrap(), 5.0);
    assert_eq!(eval("2, 3 ,+").unwrap(), 5.0);
}

#[test]
fn variables() {
    let calculator = RpnCalculator::new(RpnExpression::parse("value,2,*"));

    let mut vars = HashMap::new();
    vars.insert(Box::from("value"), 21.0);
    assert_eq!(calculator.calculate(&vars, 0.0).unwrap(), 42.0);

    // Stateless per call: a new snapshot gives a new result.
    vars.insert(Box::from("value"), 10.0);
    assert_eq!(calculator.calculate(&vars, 0.0).unwrap(), 20.0);
}

#[test]
fn variable_names() {
    let expression = RpnExpression::parse("a,b,+,a,*,TIME,+");
    assert_eq!(expression.variable_names(), ["a", "b"]);
}

#[test]
fn underflow() {
    assert!(matches!(eval("+"), Err(ExpressionError::StackUnderflow)));
    assert!(matches!(eval("1,IF"), Err(ExpressionError::StackUnderflow)));
}

#[test]
fn leftover_stack() {
    assert!(matches!(
        eval("1,2"),
        Err(ExpressionError::MalformedExpression(_))
    ));
    assert!(matches!(eval(""), Err(ExpressionError::MalformedExpression(_))));
}

#[test]
fn undefined_variable() {
    match eval("FOO") {
        Err(ExpressionError::UndefinedVariable(name)) => assert_eq!(name.as_ref(), "FOO"),
        other => panic!("expected UndefinedVariable, got {other:?}"),
    }
}

#[test]
fn overflow() {
    let calculator =
        RpnCalculator::with_stack_capacity(RpnExpression::parse("1,2,3,+,+"), 2);
    assert!(matches!(
        calculator.calculate(&HashMap::new(), 0.0),
        Err(ExpressionError::StackOverflow)
    ));
}
