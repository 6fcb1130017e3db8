//! Tree-driven C++ emission with on-the-fly type inference. One
//! `CodeGenerator` owns all state for a single run; generation errors are
//! fatal and no partial output survives them.

use anyhow::{bail, Result};
use std::collections::HashMap;

use self::cpp_runtime::{
    escape_cpp_string, CPP_CONTAINERS, CPP_HEADERS, CPP_INDEXING, CPP_NUMERIC, CPP_REPR,
    CPP_STRINGS,
};
use crate::ast::{
    BinaryOp, ClassDef, Expression, ForTarget, FunctionDef, Program, Statement, UnaryOp,
};
use crate::symbols::{Category, SymbolTable, Type};

pub mod cpp_runtime;

struct FunctionSig {
    arity: usize,
    return_type: Type,
}

struct ClassInfo {
    ctor_arity: usize,
    /// Method name to arity, the implicit self parameter excluded.
    methods: HashMap<String, usize>,
}

pub struct CodeGenerator {
    symbols: SymbolTable,
    functions: HashMap<String, FunctionSig>,
    classes: HashMap<String, ClassInfo>,
    /// Variable name to class name, for instances built in `main`.
    instances: HashMap<String, String>,
    in_function: bool,
    in_method: bool,
    loop_depth: usize,
}

impl Default for CodeGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl CodeGenerator {
    pub fn new() -> Self {
        Self {
            symbols: SymbolTable::new(),
            functions: HashMap::new(),
            classes: HashMap::new(),
            instances: HashMap::new(),
            in_function: false,
            in_method: false,
            loop_depth: 0,
        }
    }

    /// Emits a complete C++ program. Consumes the generator: symbol and
    /// function tables are state of exactly one run.
    pub fn generate(mut self, program: &Program) -> Result<String> {
        let (functions, classes, main_statements) = split_program(program);

        // Signature pre-pass: every callee is registered before any body is
        // emitted, so forward and recursive references pass arity checks.
        for class in &classes {
            let ctor_arity = class
                .constructor
                .as_ref()
                .map(|ctor| non_self_params(ctor).len())
                .unwrap_or(0);
            let methods = class
                .methods
                .iter()
                .map(|method| (method.name.clone(), non_self_params(method).len()))
                .collect();
            self.classes
                .insert(class.name.clone(), ClassInfo { ctor_arity, methods });
            self.symbols.insert(
                &class.name,
                Type::Any,
                Some(class.line),
                None,
                Category::Function,
            );
        }
        for def in &functions {
            let return_type = self.infer_return_type(def);
            self.functions.insert(
                def.name.clone(),
                FunctionSig {
                    arity: def.params.len(),
                    return_type,
                },
            );
            self.symbols.insert(
                &def.name,
                return_type,
                Some(def.line),
                None,
                Category::Function,
            );
        }

        let mut output = String::new();
        output.push_str(CPP_HEADERS);
        output.push_str(CPP_CONTAINERS);
        output.push_str(CPP_NUMERIC);
        output.push_str(CPP_INDEXING);
        output.push_str(CPP_STRINGS);
        output.push_str(CPP_REPR);

        for class in &classes {
            self.emit_class(class, &mut output)?;
        }
        for def in &functions {
            self.emit_function(def, &mut output)?;
        }

        output.push_str("int main() {\n");
        for statement in &main_statements {
            self.emit_statement(statement, 1, &mut output)?;
        }
        output.push_str("    return 0;\n");
        output.push_str("}\n");
        Ok(output)
    }

    fn emit_function(&mut self, def: &FunctionDef, output: &mut String) -> Result<()> {
        let params = def
            .params
            .iter()
            .map(|param| format!("std::any {param}"))
            .collect::<Vec<_>>()
            .join(", ");
        output.push_str(&format!("auto {}({params}) {{\n", def.name));

        self.symbols.enter_scope(Some(&def.name));
        let was_in_function = self.in_function;
        let outer_loops = self.loop_depth;
        self.in_function = true;
        self.loop_depth = 0;
        for param in &def.params {
            self.symbols.insert(
                param,
                Type::Any,
                Some(def.line),
                None,
                Category::Parameter,
            );
        }
        let result = self.emit_body(&def.body, 1, output);
        self.symbols.exit_scope();
        self.in_function = was_in_function;
        self.loop_depth = outer_loops;
        result?;

        output.push_str("}\n\n");
        Ok(())
    }

    fn emit_class(&mut self, class: &ClassDef, output: &mut String) -> Result<()> {
        output.push_str(&format!("struct {} {{\n", class.name));

        for member in class_members(class) {
            self.push_line(output, 1, &format!("std::any {member};"));
        }

        if let Some(ctor) = &class.constructor {
            let params = non_self_params(ctor)
                .iter()
                .map(|param| format!("std::any {param}"))
                .collect::<Vec<_>>()
                .join(", ");
            self.push_line(output, 1, &format!("{}({params}) {{", class.name));
            self.emit_method_body(ctor, output)?;
            self.push_line(output, 1, "}");
        }

        for method in &class.methods {
            let params = non_self_params(method)
                .iter()
                .map(|param| format!("std::any {param}"))
                .collect::<Vec<_>>()
                .join(", ");
            self.push_line(output, 1, &format!("auto {}({params}) {{", method.name));
            self.emit_method_body(method, output)?;
            self.push_line(output, 1, "}");
        }

        output.push_str("};\n\n");
        Ok(())
    }

    fn emit_method_body(&mut self, def: &FunctionDef, output: &mut String) -> Result<()> {
        self.symbols.enter_scope(Some(&def.name));
        let was_in_function = self.in_function;
        let was_in_method = self.in_method;
        self.in_function = true;
        self.in_method = true;
        for param in non_self_params(def) {
            self.symbols.insert(
                &param,
                Type::Any,
                Some(def.line),
                None,
                Category::Parameter,
            );
        }
        let result = self.emit_body(&def.body, 2, output);
        self.symbols.exit_scope();
        self.in_function = was_in_function;
        self.in_method = was_in_method;
        result
    }

    fn emit_statement(
        &mut self,
        statement: &Statement,
        indent: usize,
        output: &mut String,
    ) -> Result<()> {
        match statement {
            Statement::Assign { target, value, line } => {
                self.emit_assignment(target, value, *line, indent, output)?;
            }
            Statement::AugAssign { target, op, value, line } => {
                self.emit_compound_assignment(target, *op, value, *line, indent, output)?;
            }
            Statement::AttrAssign { object, attr, value, .. } => {
                let target = self.render_attribute(object, attr)?;
                // Members are std::any, so a parameter moves in uncast.
                let rendered = match value {
                    Expression::Identifier(name) if self.is_uncast_parameter(name) => {
                        name.clone()
                    }
                    other => self.emit_expression(other)?,
                };
                self.push_line(output, indent, &format!("{target} = {rendered};"));
            }
            Statement::If {
                condition,
                then_body,
                elif_parts,
                else_body,
                ..
            } => {
                let rendered = self.emit_expression(condition)?;
                self.push_line(output, indent, &format!("if ({rendered}) {{"));
                self.emit_scoped_block(then_body, indent + 1, output)?;
                self.push_line(output, indent, "}");
                for (elif_condition, elif_body) in elif_parts {
                    let rendered = self.emit_expression(elif_condition)?;
                    self.push_line(output, indent, &format!("else if ({rendered}) {{"));
                    self.emit_scoped_block(elif_body, indent + 1, output)?;
                    self.push_line(output, indent, "}");
                }
                if let Some(else_body) = else_body {
                    self.push_line(output, indent, "else {");
                    self.emit_scoped_block(else_body, indent + 1, output)?;
                    self.push_line(output, indent, "}");
                }
            }
            Statement::While { condition, body, .. } => {
                let rendered = self.emit_expression(condition)?;
                self.push_line(output, indent, &format!("while ({rendered}) {{"));
                self.loop_depth += 1;
                let result = self.emit_scoped_block(body, indent + 1, output);
                self.loop_depth -= 1;
                result?;
                self.push_line(output, indent, "}");
            }
            Statement::For { var, target, body, line } => {
                self.emit_for(var, target, body, *line, indent, output)?;
            }
            Statement::Return { value, .. } => {
                if !self.in_function {
                    bail!("Return outside of a function is not supported");
                }
                match value {
                    Some(value) => {
                        let rendered = self.emit_expression(value)?;
                        self.push_line(output, indent, &format!("return {rendered};"));
                    }
                    None => self.push_line(output, indent, "return;"),
                }
            }
            Statement::Break { line } => {
                if self.loop_depth == 0 {
                    bail!("'break' outside of a loop at line {line}");
                }
                self.push_line(output, indent, "break;");
            }
            Statement::Continue { line } => {
                if self.loop_depth == 0 {
                    bail!("'continue' outside of a loop at line {line}");
                }
                self.push_line(output, indent, "continue;");
            }
            Statement::Pass => {}
            Statement::Expr(Expression::Call { name, args, line }) if name == "print" => {
                self.emit_print(args, *line, indent, output)?;
            }
            Statement::Expr(expr) => {
                let rendered = self.emit_expression(expr)?;
                self.push_line(output, indent, &format!("{rendered};"));
            }
            Statement::FunctionDef(def) => {
                bail!(
                    "Nested function definitions are not supported ('{}' at line {})",
                    def.name,
                    def.line
                );
            }
            Statement::ClassDef(class) => {
                bail!(
                    "Nested class definitions are not supported ('{}' at line {})",
                    class.name,
                    class.line
                );
            }
        }
        Ok(())
    }

    /// Declares, reassigns, or re-declares under a versioned name when the
    /// inferred type changed — C++ forbids redeclaring a name in one scope,
    /// so dynamic retyping becomes `x`, `x_v1`, `x_v2`, ...
    fn emit_assignment(
        &mut self,
        target: &str,
        value: &Expression,
        line: usize,
        indent: usize,
        output: &mut String,
    ) -> Result<()> {
        // Instantiating a class declares the object with auto.
        if let Expression::Call { name, .. } = value {
            if self.classes.contains_key(name) {
                let rendered = self.emit_expression(value)?;
                self.instances.insert(target.to_string(), name.clone());
                if self.symbols.lookup(target).is_none() {
                    self.symbols.insert(
                        target,
                        Type::Any,
                        Some(line),
                        None,
                        Category::Variable,
                    );
                    self.push_line(output, indent, &format!("auto {target} = {rendered};"));
                } else {
                    self.push_line(output, indent, &format!("{target} = {rendered};"));
                }
                return Ok(());
            }
        }

        let ty = self.symbols.infer_expression(value);
        let rendered = self.emit_expression(value)?;
        let literal = literal_value(value);

        match self.symbols.lookup(target) {
            None => {
                self.symbols
                    .insert(target, ty, Some(line), literal, Category::Variable);
                self.push_line(
                    output,
                    indent,
                    &format!("{} {target} = {rendered};", cpp_type(ty)),
                );
            }
            Some(symbol) if symbol.ty == ty => {
                let name = self.render_assign_target(target);
                self.push_line(output, indent, &format!("{name} = {rendered};"));
            }
            Some(_) => {
                let version = if self.symbols.lookup_current_scope(target).is_some() {
                    let symbol = self.symbols.lookup_mut(target).unwrap();
                    symbol.version += 1;
                    symbol.ty = ty;
                    symbol.category = Category::Variable;
                    symbol.value = literal;
                    symbol.version
                } else {
                    // The name lives in an enclosing scope and the versioned
                    // declaration below is confined to this C++ block, so the
                    // bump is recorded as a shadow in the block's own scope;
                    // reads after the block resolve to the old declaration.
                    let outer_version = self.symbols.lookup(target).unwrap().version;
                    self.symbols
                        .insert(target, ty, Some(line), literal, Category::Variable);
                    let symbol = self.symbols.lookup_mut(target).unwrap();
                    symbol.version = outer_version + 1;
                    symbol.version
                };
                self.push_line(
                    output,
                    indent,
                    &format!("{} {target}_v{version} = {rendered};", cpp_type(ty)),
                );
            }
        }
        Ok(())
    }

    fn emit_compound_assignment(
        &mut self,
        target: &str,
        op: BinaryOp,
        value: &Expression,
        line: usize,
        indent: usize,
        output: &mut String,
    ) -> Result<()> {
        let Some(symbol) = self.symbols.lookup(target) else {
            bail!("Variable '{target}' is not declared at line {line}");
        };
        let target_ty = symbol.ty;
        let value_ty = self.symbols.infer_expression(value);
        if !value_ty.is_numeric() {
            bail!(
                "Compound assignment to '{target}' requires a numeric right-hand side, got {} \
                 at line {line}",
                value_ty.name()
            );
        }
        // A dynamically-typed target (a parameter, an element read) takes
        // the type of its numeric right-hand side; the hard error is for
        // concretely incompatible pairs like str and int.
        let dynamic_target = matches!(
            target_ty,
            Type::Any | Type::Unknown | Type::Element | Type::Value
        );
        if !dynamic_target
            && self
                .symbols
                .check_type_compatibility(target_ty, value_ty, Some(op))
                .is_none()
        {
            bail!(
                "Type error: cannot apply '{}=' to {} and {} at line {line}",
                op.symbol(),
                target_ty.name(),
                value_ty.name()
            );
        }

        let name = self.render_assign_target(target);
        // Reads of a std::any parameter need the cast; plain variables
        // read back under the same name they are written to.
        let read = self.render_identifier(target)?;
        let rendered = self.emit_expression(value)?;
        let text = match op {
            BinaryOp::FloorDiv => format!("{name} = py_floordiv({read}, {rendered});"),
            BinaryOp::Pow => format!("{name} = std::pow({read}, {rendered});"),
            BinaryOp::Mod if target_ty == Type::Float || value_ty == Type::Float => {
                format!("{name} = py_mod({read}, {rendered});")
            }
            other if read != name => {
                format!("{name} = ({read} {} {rendered});", other.symbol())
            }
            other => format!("{name} {}= {rendered};", other.symbol()),
        };
        self.push_line(output, indent, &text);
        if dynamic_target {
            self.symbols.update_type(target, value_ty);
        }
        Ok(())
    }

    fn emit_for(
        &mut self,
        var: &str,
        target: &ForTarget,
        body: &[Statement],
        line: usize,
        indent: usize,
        output: &mut String,
    ) -> Result<()> {
        match target {
            ForTarget::Range { start, end } => {
                let start_rendered = match start {
                    Some(start) => self.emit_expression(start)?,
                    None => "0".to_string(),
                };
                let end_ty = self.symbols.infer_expression(end);
                let mut end_rendered = self.emit_expression(end)?;
                if end_ty == Type::Float {
                    end_rendered = format!("(long long)({end_rendered})");
                }
                self.push_line(
                    output,
                    indent,
                    &format!(
                        "for (long long {var} = {start_rendered}; {var} < {end_rendered}; {var}++) {{"
                    ),
                );
                self.loop_depth += 1;
                self.symbols.enter_scope(None);
                self.symbols.insert(
                    var,
                    Type::Int,
                    Some(line),
                    None,
                    Category::LoopVariable,
                );
                let result = self.emit_body(body, indent + 1, output);
                self.symbols.exit_scope();
                self.loop_depth -= 1;
                result?;
                self.push_line(output, indent, "}");
            }
            ForTarget::Iterable(iterable) => {
                let iterable_ty = self.symbols.infer_expression(iterable);
                let rendered = self.emit_expression(iterable)?;
                let (header, var_ty, key_binding) = match iterable_ty {
                    Type::Dict => (
                        format!("for (const auto &{var}__entry : {rendered}) {{"),
                        Type::Str,
                        Some(format!("std::string {var} = {var}__entry.first;")),
                    ),
                    Type::Str => (
                        format!("for (const auto &{var} : py_slice({rendered}, 0, PY_END)) {{"),
                        Type::Str,
                        None,
                    ),
                    _ => (
                        format!("for (const auto &{var} : {rendered}) {{"),
                        Type::Element,
                        None,
                    ),
                };
                self.push_line(output, indent, &header);
                self.loop_depth += 1;
                self.symbols.enter_scope(None);
                self.symbols.insert(
                    var,
                    var_ty,
                    Some(line),
                    None,
                    Category::LoopVariable,
                );
                if let Some(binding) = key_binding {
                    self.push_line(output, indent + 1, &binding);
                }
                let result = self.emit_body(body, indent + 1, output);
                self.symbols.exit_scope();
                self.loop_depth -= 1;
                result?;
                self.push_line(output, indent, "}");
            }
        }
        Ok(())
    }

    fn emit_print(
        &mut self,
        args: &[Expression],
        _line: usize,
        indent: usize,
        output: &mut String,
    ) -> Result<()> {
        if args.is_empty() {
            self.push_line(output, indent, "std::cout << std::endl;");
            return Ok(());
        }
        let mut parts = Vec::with_capacity(args.len());
        for arg in args {
            let ty = self.symbols.infer_expression(arg);
            let rendered = self.emit_expression(arg)?;
            parts.push(match ty {
                Type::Int | Type::Float | Type::Str => rendered,
                _ => format!("py_repr({rendered})"),
            });
        }
        let joined = parts.join(" << \" \" << ");
        self.push_line(output, indent, &format!("std::cout << {joined} << std::endl;"));
        Ok(())
    }

    fn emit_expression(&mut self, expr: &Expression) -> Result<String> {
        match expr {
            Expression::Integer(value) => Ok(value.to_string()),
            Expression::Float(value) => Ok(format!("{value:?}")),
            Expression::Bool(value) => Ok(if *value { "true" } else { "false" }.to_string()),
            Expression::Str(value) => {
                Ok(format!("std::string(\"{}\")", escape_cpp_string(value)))
            }
            Expression::None => Ok("std::any()".to_string()),
            Expression::Identifier(name) => self.render_identifier(name),
            Expression::Binary { left, op, right } => self.emit_binary(left, *op, right),
            Expression::Unary { op, operand } => {
                let rendered = self.emit_expression(operand)?;
                Ok(match op {
                    UnaryOp::Not => format!("(!{rendered})"),
                    UnaryOp::Neg => format!("(-{rendered})"),
                })
            }
            Expression::Call { name, args, line } => self.emit_call(name, args, *line),
            Expression::MethodCall {
                object,
                method,
                args,
                line,
            } => self.emit_method_call(object, method, args, *line),
            Expression::StrConvert(inner) => {
                let rendered = self.emit_expression(inner)?;
                Ok(format!("py_str({rendered})"))
            }
            Expression::Attribute { object, name } => self.render_attribute(object, name),
            Expression::List(items) | Expression::Tuple(items) | Expression::Set(items) => {
                let rendered = items
                    .iter()
                    .map(|item| self.emit_expression(item))
                    .collect::<Result<Vec<_>>>()?;
                Ok(format!("PyList{{{}}}", rendered.join(", ")))
            }
            Expression::Dict(entries) => {
                let mut rendered = Vec::with_capacity(entries.len());
                for (key, value) in entries {
                    let key_rendered = match key {
                        Expression::Str(text) => {
                            format!("std::string(\"{}\")", escape_cpp_string(text))
                        }
                        other => format!("py_str({})", self.emit_expression(other)?),
                    };
                    let value_rendered = self.emit_expression(value)?;
                    rendered.push(format!("{{{key_rendered}, std::any({value_rendered})}}"));
                }
                Ok(format!("PyDict{{{}}}", rendered.join(", ")))
            }
            Expression::Index { base, index } => {
                let base_ty = self.symbols.infer_expression(base);
                let base_rendered = self.emit_expression(base)?;
                if base_ty == Type::Dict {
                    let key_rendered = match index.as_ref() {
                        Expression::Str(text) => {
                            format!("std::string(\"{}\")", escape_cpp_string(text))
                        }
                        other => format!("py_str({})", self.emit_expression(other)?),
                    };
                    return Ok(format!("py_dict_get({base_rendered}, {key_rendered})"));
                }
                let index_rendered = self.emit_expression(index)?;
                Ok(format!("py_index({base_rendered}, {index_rendered})"))
            }
            Expression::Slice { base, lower, upper } => {
                let base_rendered = self.emit_expression(base)?;
                let lower_rendered = match lower {
                    Some(lower) => self.emit_expression(lower)?,
                    None => "0".to_string(),
                };
                let upper_rendered = match upper {
                    Some(upper) => self.emit_expression(upper)?,
                    None => "PY_END".to_string(),
                };
                Ok(format!(
                    "py_slice({base_rendered}, {lower_rendered}, {upper_rendered})"
                ))
            }
        }
    }

    fn emit_binary(&mut self, left: &Expression, op: BinaryOp, right: &Expression) -> Result<String> {
        if op.is_arithmetic() {
            let left_ty = self.symbols.infer_expression(left);
            let right_ty = self.symbols.infer_expression(right);
            if is_concrete(left_ty) && is_concrete(right_ty) {
                match self.symbols.check_type_compatibility(left_ty, right_ty, Some(op)) {
                    None => bail!(
                        "Type error: operator '{}' cannot combine {} and {}",
                        op.symbol(),
                        left_ty.name(),
                        right_ty.name()
                    ),
                    Some(Type::Int | Type::Float | Type::Str) => {}
                    Some(other) => bail!(
                        "Operator '{}' is not supported for {} values",
                        op.symbol(),
                        other.name()
                    ),
                }
            }
        }

        let left_rendered = self.emit_expression(left)?;
        let right_rendered = self.emit_expression(right)?;
        let rendered = match op {
            BinaryOp::FloorDiv => format!("py_floordiv({left_rendered}, {right_rendered})"),
            BinaryOp::Pow => format!("std::pow({left_rendered}, {right_rendered})"),
            BinaryOp::And => format!("({left_rendered} && {right_rendered})"),
            BinaryOp::Or => format!("({left_rendered} || {right_rendered})"),
            BinaryOp::Eq => format!("({left_rendered} == {right_rendered})"),
            BinaryOp::NotEq => format!("({left_rendered} != {right_rendered})"),
            BinaryOp::Less => format!("({left_rendered} < {right_rendered})"),
            BinaryOp::Greater => format!("({left_rendered} > {right_rendered})"),
            BinaryOp::LessEq => format!("({left_rendered} <= {right_rendered})"),
            BinaryOp::GreaterEq => format!("({left_rendered} >= {right_rendered})"),
            BinaryOp::Add => format!("({left_rendered} + {right_rendered})"),
            BinaryOp::Sub => format!("({left_rendered} - {right_rendered})"),
            BinaryOp::Mul => format!("({left_rendered} * {right_rendered})"),
            BinaryOp::Div => format!("({left_rendered} / {right_rendered})"),
            // C++ has no % for doubles; float modulo goes through fmod.
            BinaryOp::Mod => {
                let left_ty = self.symbols.infer_expression(left);
                let right_ty = self.symbols.infer_expression(right);
                if left_ty == Type::Float || right_ty == Type::Float {
                    format!("py_mod({left_rendered}, {right_rendered})")
                } else {
                    format!("({left_rendered} % {right_rendered})")
                }
            }
        };
        Ok(rendered)
    }

    fn emit_call(&mut self, name: &str, args: &[Expression], line: usize) -> Result<String> {
        match name {
            "print" => bail!("print() is only supported as a statement (line {line})"),
            "range" => bail!("range() is only supported as a for-loop iterable (line {line})"),
            "len" => {
                if args.len() != 1 {
                    bail!("len() expects 1 argument, got {} at line {line}", args.len());
                }
                let rendered = self.emit_expression(&args[0])?;
                return Ok(format!("py_len({rendered})"));
            }
            _ => {}
        }

        if let Some(sig) = self.functions.get(name) {
            if sig.arity != args.len() {
                bail!(
                    "Function '{name}' expects {} arguments, got {} at line {line}",
                    sig.arity,
                    args.len()
                );
            }
        } else if let Some(info) = self.classes.get(name) {
            if info.ctor_arity != args.len() {
                bail!(
                    "Class '{name}' expects {} constructor arguments, got {} at line {line}",
                    info.ctor_arity,
                    args.len()
                );
            }
        } else {
            bail!("Function '{name}' is not defined at line {line}");
        }

        let rendered = args
            .iter()
            .map(|arg| self.emit_expression(arg))
            .collect::<Result<Vec<_>>>()?;
        Ok(format!("{name}({})", rendered.join(", ")))
    }

    fn emit_method_call(
        &mut self,
        object: &Expression,
        method: &str,
        args: &[Expression],
        line: usize,
    ) -> Result<String> {
        if method == "append" {
            let Expression::Identifier(name) = object else {
                bail!("append() requires a named list at line {line}");
            };
            let Some(symbol) = self.symbols.lookup(name) else {
                bail!("Variable '{name}' is not declared at line {line}");
            };
            if symbol.ty != Type::List {
                bail!(
                    "'{name}' is not a list ({}), cannot append at line {line}",
                    symbol.ty.name()
                );
            }
            if args.len() != 1 {
                bail!("append() expects 1 argument, got {} at line {line}", args.len());
            }
            let target = self.render_assign_target(name);
            let rendered = self.emit_expression(&args[0])?;
            return Ok(format!("{target}.push_back({rendered})"));
        }

        // Calls through a known instance are checked against the class's
        // registered method signatures.
        if let Expression::Identifier(name) = object {
            if let Some(class_name) = self.instances.get(name).cloned() {
                let info = &self.classes[&class_name];
                match info.methods.get(method) {
                    Some(&arity) if arity != args.len() => bail!(
                        "Method '{class_name}.{method}' expects {arity} arguments, got {} \
                         at line {line}",
                        args.len()
                    ),
                    Some(_) => {}
                    None => bail!(
                        "Class '{class_name}' has no method '{method}' at line {line}"
                    ),
                }
            }
        }

        let object_rendered = self.emit_expression(object)?;
        let rendered = args
            .iter()
            .map(|arg| self.emit_expression(arg))
            .collect::<Result<Vec<_>>>()?;
        Ok(format!("{object_rendered}.{method}({})", rendered.join(", ")))
    }

    /// Reads resolve to the newest declared version of a name. Parameters
    /// arrive as std::any and are cast at their use sites.
    fn render_identifier(&self, name: &str) -> Result<String> {
        if name == "self" && self.in_method {
            return Ok("(*this)".to_string());
        }
        let Some(symbol) = self.symbols.lookup(name) else {
            bail!("Variable '{name}' is not declared");
        };
        if symbol.category == Category::Parameter && symbol.version == 0 {
            let cast = match symbol.ty {
                ty if is_concrete(ty) => cpp_type(ty),
                _ => "long long",
            };
            return Ok(format!("std::any_cast<{cast}>({name})"));
        }
        Ok(versioned_name(name, symbol.version))
    }

    fn is_uncast_parameter(&self, name: &str) -> bool {
        self.symbols
            .lookup(name)
            .map(|symbol| symbol.category == Category::Parameter && symbol.version == 0)
            .unwrap_or(false)
    }

    /// Assignment targets never take the any-cast; writing a concrete value
    /// into a std::any parameter is fine.
    fn render_assign_target(&self, name: &str) -> String {
        let version = self
            .symbols
            .lookup(name)
            .map(|symbol| symbol.version)
            .unwrap_or(0);
        versioned_name(name, version)
    }

    fn render_attribute(&mut self, object: &Expression, attr: &str) -> Result<String> {
        if matches!(object, Expression::Identifier(name) if name == "self") && self.in_method {
            return Ok(format!("this->{attr}"));
        }
        let rendered = self.emit_expression(object)?;
        Ok(format!("{rendered}.{attr}"))
    }

    fn emit_body(
        &mut self,
        body: &[Statement],
        indent: usize,
        output: &mut String,
    ) -> Result<()> {
        for statement in body {
            self.emit_statement(statement, indent, output)?;
        }
        Ok(())
    }

    /// Block bodies get their own lexical scope; the scope is popped even
    /// when emission fails partway through.
    fn emit_scoped_block(
        &mut self,
        body: &[Statement],
        indent: usize,
        output: &mut String,
    ) -> Result<()> {
        self.symbols.enter_scope(None);
        let result = self.emit_body(body, indent, output);
        self.symbols.exit_scope();
        result
    }

    /// Walks a body in order, simulating assignments, and infers the type
    /// of the first return expression found.
    fn infer_return_type(&mut self, def: &FunctionDef) -> Type {
        self.symbols.enter_scope(Some(&def.name));
        for param in &def.params {
            self.symbols.insert(
                param,
                Type::Any,
                Some(def.line),
                None,
                Category::Parameter,
            );
        }
        let ty = self.scan_return(&def.body).unwrap_or(Type::None);
        self.symbols.exit_scope();
        ty
    }

    fn scan_return(&mut self, body: &[Statement]) -> Option<Type> {
        for statement in body {
            match statement {
                Statement::Assign { target, value, .. } => {
                    let ty = self.symbols.infer_expression(value);
                    self.symbols
                        .insert(target, ty, None, None, Category::Variable);
                }
                Statement::Return { value, .. } => {
                    return Some(match value {
                        Some(value) => self.symbols.infer_expression(value),
                        None => Type::None,
                    });
                }
                Statement::If {
                    then_body,
                    elif_parts,
                    else_body,
                    ..
                } => {
                    if let Some(ty) = self.scan_return(then_body) {
                        return Some(ty);
                    }
                    for (_, elif_body) in elif_parts {
                        if let Some(ty) = self.scan_return(elif_body) {
                            return Some(ty);
                        }
                    }
                    if let Some(else_body) = else_body {
                        if let Some(ty) = self.scan_return(else_body) {
                            return Some(ty);
                        }
                    }
                }
                Statement::While { body, .. } | Statement::For { body, .. } => {
                    if let Some(ty) = self.scan_return(body) {
                        return Some(ty);
                    }
                }
                _ => {}
            }
        }
        None
    }

    fn push_line(&self, output: &mut String, indent: usize, line: &str) {
        for _ in 0..indent {
            output.push_str("    ");
        }
        output.push_str(line);
        output.push('\n');
    }
}

/// Splits top-level statements into functions, classes and the main body,
/// preserving source order within each group.
fn split_program(program: &Program) -> (Vec<&FunctionDef>, Vec<&ClassDef>, Vec<&Statement>) {
    let mut functions = Vec::new();
    let mut classes = Vec::new();
    let mut main_statements = Vec::new();
    for statement in &program.statements {
        match statement {
            Statement::FunctionDef(def) => functions.push(def),
            Statement::ClassDef(class) => classes.push(class),
            other => main_statements.push(other),
        }
    }
    (functions, classes, main_statements)
}

fn non_self_params(def: &FunctionDef) -> Vec<String> {
    def.params
        .iter()
        .filter(|param| param.as_str() != "self")
        .cloned()
        .collect()
}

/// Instance members are whatever the constructor and methods assign to
/// `self`, in first-assignment order.
fn class_members(class: &ClassDef) -> Vec<String> {
    let mut members = Vec::new();
    let mut bodies: Vec<&[Statement]> = Vec::new();
    if let Some(ctor) = &class.constructor {
        bodies.push(&ctor.body);
    }
    for method in &class.methods {
        bodies.push(&method.body);
    }
    for body in bodies {
        collect_self_assignments(body, &mut members);
    }
    members
}

fn collect_self_assignments(body: &[Statement], members: &mut Vec<String>) {
    for statement in body {
        match statement {
            Statement::AttrAssign { object, attr, .. } => {
                if matches!(object.as_ref(), Expression::Identifier(name) if name == "self")
                    && !members.contains(attr)
                {
                    members.push(attr.clone());
                }
            }
            Statement::If {
                then_body,
                elif_parts,
                else_body,
                ..
            } => {
                collect_self_assignments(then_body, members);
                for (_, elif_body) in elif_parts {
                    collect_self_assignments(elif_body, members);
                }
                if let Some(else_body) = else_body {
                    collect_self_assignments(else_body, members);
                }
            }
            Statement::While { body, .. } | Statement::For { body, .. } => {
                collect_self_assignments(body, members);
            }
            _ => {}
        }
    }
}

fn literal_value(expr: &Expression) -> Option<Expression> {
    match expr {
        Expression::Integer(_)
        | Expression::Float(_)
        | Expression::Bool(_)
        | Expression::Str(_) => Some(expr.clone()),
        _ => None,
    }
}

fn versioned_name(name: &str, version: u32) -> String {
    if version == 0 {
        name.to_string()
    } else {
        format!("{name}_v{version}")
    }
}

fn is_concrete(ty: Type) -> bool {
    matches!(
        ty,
        Type::Int
            | Type::Float
            | Type::Bool
            | Type::Str
            | Type::List
            | Type::Dict
            | Type::Set
            | Type::Tuple
    )
}

fn cpp_type(ty: Type) -> &'static str {
    match ty {
        Type::Int => "long long",
        Type::Float => "double",
        Type::Bool => "bool",
        Type::Str => "std::string",
        Type::List | Type::Tuple | Type::Set => "PyList",
        Type::Dict => "PyDict",
        Type::None | Type::Element | Type::Value | Type::Any | Type::Unknown => "std::any",
    }
}

/// Generates C++ for a parsed program with a fresh generator.
pub fn generate(program: &Program) -> Result<String> {
    CodeGenerator::new().generate(program)
}
