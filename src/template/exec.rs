//! Walks the node tree against a variable mapping.

use std::collections::HashMap;
use std::sync::Arc;

use crate::functions::TextFn;

use super::builtins::{exact, Builtin};
use super::parser::{Arg, Branch, Call, Command, Node, Pipeline, Tree};
use super::value::Value;
use super::{TemplateError, Variables, MAX_DEPTH};

/// A function callable from a template.
#[derive(Clone, Copy)]
pub(crate) enum Function {
    Builtin(Builtin),
    /// Library helper taking and returning a single string.
    Text(TextFn),
}

impl std::fmt::Debug for Function {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Function::Builtin(builtin) => write!(f, "Builtin({:?})", builtin),
            Function::Text(_) => f.write_str("Text"),
        }
    }
}

impl Function {
    fn call(&self, args: Vec<Value>) -> Result<Value, String> {
        match self {
            Function::Text(f) => {
                let [arg] = exact::<1>(args)?;
                match arg.as_bytes() {
                    Some(text) => Ok(Value::Str(f(text))),
                    None => Err(format!(
                        "wrong type for value; expected string; got {}",
                        arg.type_name()
                    )),
                }
            }
            Function::Builtin(builtin) => builtin.call(args),
        }
    }
}

/// How a list finished: normally, or through `break` or `continue`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Next,
    Break,
    Continue,
}

pub(crate) fn execute(tree: &Tree, variables: Arc<Variables>) -> Result<Vec<u8>, TemplateError> {
    let root = Value::Map(variables);
    let mut state = State {
        defines: &tree.defines,
        out: Vec::new(),
        vars: vec![("$".to_string(), root.clone())],
        depth: 0,
    };
    state.walk_list(&tree.root, &root)?;
    Ok(state.out)
}

struct State<'t> {
    defines: &'t HashMap<String, Vec<Node>>,
    out: Vec<u8>,
    /// Variable stack, innermost last.
    vars: Vec<(String, Value)>,
    depth: usize,
}

impl State<'_> {
    fn descend(&mut self, line: usize) -> Result<(), TemplateError> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(TemplateError::Execute {
                line,
                message: format!("exceeded maximum template depth ({})", MAX_DEPTH),
            });
        }
        Ok(())
    }

    fn walk_list(&mut self, nodes: &[Node], dot: &Value) -> Result<Flow, TemplateError> {
        for node in nodes {
            let flow = self.walk(node, dot)?;
            if flow != Flow::Next {
                return Ok(flow);
            }
        }
        Ok(Flow::Next)
    }

    fn walk_scoped(&mut self, nodes: &[Node], dot: &Value) -> Result<Flow, TemplateError> {
        let mark = self.vars.len();
        let result = self.walk_list(nodes, dot);
        self.vars.truncate(mark);
        result
    }

    fn walk(&mut self, node: &Node, dot: &Value) -> Result<Flow, TemplateError> {
        let flow = match node {
            Node::Text(text) => {
                self.out.extend_from_slice(text.as_bytes());
                Flow::Next
            }
            Node::Action(pipe) => {
                let value = self.eval_pipeline(pipe, dot)?;
                if pipe.decl.is_empty() {
                    value.write_to(&mut self.out);
                }
                Flow::Next
            }
            Node::If(branch) | Node::With(branch) => {
                self.descend(branch.pipe.line)?;
                let flow = self.walk_conditional(branch, dot, matches!(node, Node::With(_)))?;
                self.depth -= 1;
                flow
            }
            Node::Range(branch) => {
                self.descend(branch.pipe.line)?;
                let flow = self.walk_range(branch, dot)?;
                self.depth -= 1;
                flow
            }
            Node::Template(call) => {
                self.descend(call.line)?;
                self.walk_template(call, dot)?;
                self.depth -= 1;
                Flow::Next
            }
            Node::Break => Flow::Break,
            Node::Continue => Flow::Continue,
        };
        Ok(flow)
    }

    /// `if` keeps dot; `with` rebinds it to the pipeline value.
    fn walk_conditional(
        &mut self,
        branch: &Branch,
        dot: &Value,
        rebind: bool,
    ) -> Result<Flow, TemplateError> {
        let mark = self.vars.len();
        let value = self.eval_pipeline(&branch.pipe, dot)?;
        let flow = if value.is_truthy() {
            let dot = if rebind { &value } else { dot };
            self.walk_scoped(&branch.list, dot)
        } else {
            self.walk_scoped(&branch.else_list, dot)
        };
        self.vars.truncate(mark);
        flow
    }

    /// Loop control inside the body stops here; inside the else list it
    /// belongs to an enclosing range and propagates.
    fn walk_range(&mut self, branch: &Branch, dot: &Value) -> Result<Flow, TemplateError> {
        let value = self.eval_commands(&branch.pipe, dot)?;
        let mark = self.vars.len();

        match &value {
            Value::Map(map) if !map.is_empty() => {
                for (key, item) in map.iter() {
                    let key = Value::string(key.as_str());
                    let item = Value::string(item.as_str());
                    if self.range_step(branch, key, item, mark)? == Flow::Break {
                        break;
                    }
                }
            }
            Value::Int(n) if *n > 0 => {
                if branch.pipe.decl.len() > 1 {
                    return Err(TemplateError::Execute {
                        line: branch.pipe.line,
                        message: format!("can't use {} to iterate over more than one variable", n),
                    });
                }
                for i in 0..*n {
                    if self.range_step(branch, Value::Int(i), Value::Int(i), mark)? == Flow::Break {
                        break;
                    }
                }
            }
            Value::Map(_) | Value::Int(_) | Value::Missing | Value::Nil => {
                return self.walk_scoped(&branch.else_list, dot);
            }
            other => {
                return Err(TemplateError::Execute {
                    line: branch.pipe.line,
                    message: format!("range can't iterate over {}", other),
                });
            }
        }
        Ok(Flow::Next)
    }

    fn range_step(
        &mut self,
        branch: &Branch,
        key: Value,
        item: Value,
        mark: usize,
    ) -> Result<Flow, TemplateError> {
        match branch.pipe.decl.as_slice() {
            [name] => self.vars.push((name.clone(), item.clone())),
            [key_name, name] => {
                self.vars.push((key_name.clone(), key));
                self.vars.push((name.clone(), item.clone()));
            }
            _ => {}
        }
        let result = self.walk_scoped(&branch.list, &item);
        self.vars.truncate(mark);
        result
    }

    /// A named template runs with dot set to the pipeline value and only
    /// `$` in scope.
    fn walk_template(&mut self, call: &Call, dot: &Value) -> Result<(), TemplateError> {
        let defines = self.defines;
        let Some(body) = defines.get(&call.name) else {
            return Err(TemplateError::Execute {
                line: call.line,
                message: format!("template {:?} not defined", call.name),
            });
        };

        let dot = match &call.pipe {
            Some(pipe) => self.eval_pipeline(pipe, dot)?,
            None => Value::Nil,
        };
        let outer = std::mem::replace(&mut self.vars, vec![("$".to_string(), dot.clone())]);
        let result = self.walk_list(body, &dot);
        self.vars = outer;
        result.map(|_| ())
    }

    /// Evaluates the pipeline and binds its declared variables.
    fn eval_pipeline(&mut self, pipe: &Pipeline, dot: &Value) -> Result<Value, TemplateError> {
        let value = self.eval_commands(pipe, dot)?;

        for name in &pipe.decl {
            if pipe.is_assign {
                match self.vars.iter_mut().rev().find(|(n, _)| n == name) {
                    Some(slot) => slot.1 = value.clone(),
                    None => {
                        return Err(TemplateError::Execute {
                            line: pipe.line,
                            message: format!("undefined variable: {}", name),
                        })
                    }
                }
            } else {
                self.vars.push((name.clone(), value.clone()));
            }
        }

        Ok(value)
    }

    fn eval_commands(&mut self, pipe: &Pipeline, dot: &Value) -> Result<Value, TemplateError> {
        let mut value = None;
        for cmd in &pipe.cmds {
            value = Some(self.eval_command(cmd, dot, value.take(), pipe.line)?);
        }
        Ok(value.unwrap_or(Value::Missing))
    }

    fn eval_command(
        &mut self,
        cmd: &Command,
        dot: &Value,
        piped: Option<Value>,
        line: usize,
    ) -> Result<Value, TemplateError> {
        let Some((first, rest)) = cmd.args.split_first() else {
            return Ok(Value::Missing);
        };

        if let Arg::Func(name, func) = first {
            if let Function::Builtin(builtin @ (Builtin::And | Builtin::Or)) = func {
                if !rest.is_empty() {
                    return self.eval_logical(*builtin, rest, piped, dot, line);
                }
            }

            let mut args = Vec::with_capacity(rest.len() + 1);
            for arg in rest {
                args.push(self.eval_arg(arg, dot, line)?);
            }
            args.extend(piped);
            return call(name, func, args, line);
        }

        if piped.is_some() {
            return Err(TemplateError::Execute {
                line,
                message: "can't give argument to non-function".to_string(),
            });
        }
        self.eval_arg(first, dot, line)
    }

    /// `and` and `or` stop evaluating at the first deciding operand.
    fn eval_logical(
        &mut self,
        builtin: Builtin,
        args: &[Arg],
        piped: Option<Value>,
        dot: &Value,
        line: usize,
    ) -> Result<Value, TemplateError> {
        let stop_on = builtin == Builtin::Or;
        let mut last = Value::Missing;
        for arg in args {
            let value = self.eval_arg(arg, dot, line)?;
            if value.is_truthy() == stop_on {
                return Ok(value);
            }
            last = value;
        }
        Ok(piped.unwrap_or(last))
    }

    fn eval_arg(&mut self, arg: &Arg, dot: &Value, line: usize) -> Result<Value, TemplateError> {
        match arg {
            Arg::Dot => Ok(dot.clone()),
            Arg::Field(path) => resolve_path(dot.clone(), path, line),
            Arg::Variable(name, path) => {
                let value = self
                    .vars
                    .iter()
                    .rev()
                    .find(|(n, _)| n == name)
                    .map(|(_, v)| v.clone())
                    .ok_or_else(|| TemplateError::Execute {
                        line,
                        message: format!("undefined variable: {}", name),
                    })?;
                resolve_path(value, path, line)
            }
            Arg::Func(name, func) => call(name, func, Vec::new(), line),
            Arg::Str(s) => Ok(Value::string(s.as_str())),
            Arg::Int(n) => Ok(Value::Int(*n)),
            Arg::Bool(b) => Ok(Value::Bool(*b)),
            Arg::Nil => Ok(Value::Nil),
            Arg::Pipe(pipe) => {
                self.descend(pipe.line)?;
                let value = self.eval_commands(pipe, dot);
                self.depth -= 1;
                value
            }
        }
    }
}

fn call(name: &str, func: &Function, args: Vec<Value>, line: usize) -> Result<Value, TemplateError> {
    func.call(args).map_err(|message| TemplateError::Execute {
        line,
        message: format!("error calling {}: {}", name, message),
    })
}

fn resolve_path(mut value: Value, path: &[String], line: usize) -> Result<Value, TemplateError> {
    for key in path {
        value = match value {
            Value::Map(map) => map
                .get(key)
                .map(|v| Value::string(v.as_str()))
                .unwrap_or(Value::Missing),
            Value::Missing => Value::Missing,
            other => {
                return Err(TemplateError::Execute {
                    line,
                    message: format!("can't evaluate field {} in type {}", key, other.type_name()),
                })
            }
        };
    }
    Ok(value)
}
