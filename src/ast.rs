//! AST node types produced by the external parser.
//!
//! Only the shapes the abstract operations look at are modelled in detail:
//! declarations, the statements that can contain them, and binding patterns.
//! Expressions are carried through untouched for the backend to execute.

use std::cell::Cell;
use std::rc::Rc;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SourceType {
    Script,
    Module,
}

#[derive(Clone, Debug)]
pub struct Program {
    pub source_type: SourceType,
    pub body: Vec<Statement>,
    /// Set by the parser when the surrounding code forced strict mode.
    pub strict: bool,
}

#[derive(Clone, Debug)]
pub enum Statement {
    Empty,
    Expression(Expression),
    Block(Vec<Statement>),
    Variable(VariableDeclaration),
    If(IfStatement),
    While(WhileStatement),
    DoWhile(WhileStatement),
    For(ForStatement),
    ForIn(ForInOfStatement),
    ForOf(ForInOfStatement),
    Return(Option<Expression>),
    Break(Option<String>),
    Continue(Option<String>),
    Throw(Expression),
    Try(TryStatement),
    Switch(SwitchStatement),
    Labeled(String, Box<Statement>),
    With(Expression, Box<Statement>),
    Debugger,
    FunctionDeclaration(Rc<FunctionDecl>),
    ClassDeclaration(ClassDecl),
}

#[derive(Clone, Debug)]
pub struct VariableDeclaration {
    pub kind: VarKind,
    pub declarations: Vec<VariableDeclarator>,
}

impl VariableDeclaration {
    pub fn for_each_bound_name(&self, f: &mut dyn FnMut(&str)) {
        for d in &self.declarations {
            d.pattern.for_each_bound_name(f);
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VarKind {
    Var,
    Let,
    Const,
    Using,
    AwaitUsing,
}

impl VarKind {
    pub fn is_lexical(self) -> bool {
        !matches!(self, VarKind::Var)
    }
}

#[derive(Clone, Debug)]
pub struct VariableDeclarator {
    pub pattern: Pattern,
    pub init: Option<Expression>,
}

#[derive(Clone, Debug)]
pub enum Pattern {
    Identifier(String),
    Array(Vec<Option<ArrayPatternElement>>),
    Object(Vec<ObjectPatternProperty>),
    Assign(Box<Pattern>, Box<Expression>),
    Rest(Box<Pattern>),
}

impl Pattern {
    /// BoundNames, in source order.
    pub fn for_each_bound_name(&self, f: &mut dyn FnMut(&str)) {
        match self {
            Pattern::Identifier(name) => f(name),
            Pattern::Array(elems) => {
                for elem in elems.iter().flatten() {
                    match elem {
                        ArrayPatternElement::Pattern(p) | ArrayPatternElement::Rest(p) => {
                            p.for_each_bound_name(f)
                        }
                    }
                }
            }
            Pattern::Object(props) => {
                for prop in props {
                    match prop {
                        ObjectPatternProperty::KeyValue(_, p) | ObjectPatternProperty::Rest(p) => {
                            p.for_each_bound_name(f)
                        }
                        ObjectPatternProperty::Shorthand(name) => f(name),
                    }
                }
            }
            Pattern::Assign(inner, _) | Pattern::Rest(inner) => inner.for_each_bound_name(f),
        }
    }
}

#[derive(Clone, Debug)]
pub enum ArrayPatternElement {
    Pattern(Pattern),
    Rest(Pattern),
}

#[derive(Clone, Debug)]
pub enum ObjectPatternProperty {
    KeyValue(String, Pattern),
    Shorthand(String),
    Rest(Pattern),
}

#[derive(Clone, Debug)]
pub enum Expression {
    Literal(Literal),
    Identifier(String),
    This,
    Function(Rc<FunctionDecl>),
    ArrowFunction(Rc<FunctionDecl>),
    Class(ClassDecl),
    Binary(BinaryOp, Box<Expression>, Box<Expression>),
    Assign(Box<Expression>, Box<Expression>),
    Call(Box<Expression>, Vec<Expression>),
    New(Box<Expression>, Vec<Expression>),
    Member(Box<Expression>, String),
    Sequence(Vec<Expression>),
    SuperMember(String),
    SuperCall(Vec<Expression>),
    Import(Box<Expression>, Option<Box<Expression>>),
    NewTarget,
}

#[derive(Clone, Debug)]
pub enum Literal {
    Undefined,
    Null,
    Boolean(bool),
    Number(f64),
    String(String),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    StrictEq,
}

#[derive(Clone, Debug)]
pub struct IfStatement {
    pub test: Expression,
    pub consequent: Box<Statement>,
    pub alternate: Option<Box<Statement>>,
}

#[derive(Clone, Debug)]
pub struct WhileStatement {
    pub test: Expression,
    pub body: Box<Statement>,
}

#[derive(Clone, Debug)]
pub struct ForStatement {
    pub init: Option<ForInit>,
    pub test: Option<Expression>,
    pub update: Option<Expression>,
    pub body: Box<Statement>,
}

#[derive(Clone, Debug)]
pub enum ForInit {
    Variable(VariableDeclaration),
    Expression(Expression),
}

#[derive(Clone, Debug)]
pub struct ForInOfStatement {
    pub left: ForInOfLeft,
    pub right: Expression,
    pub body: Box<Statement>,
}

#[derive(Clone, Debug)]
pub enum ForInOfLeft {
    Variable(VariableDeclaration),
    Pattern(Pattern),
}

#[derive(Clone, Debug)]
pub struct TryStatement {
    pub block: Vec<Statement>,
    pub handler: Option<CatchClause>,
    pub finalizer: Option<Vec<Statement>>,
}

#[derive(Clone, Debug)]
pub struct CatchClause {
    pub param: Option<Pattern>,
    pub body: Vec<Statement>,
}

#[derive(Clone, Debug)]
pub struct SwitchStatement {
    pub discriminant: Expression,
    pub cases: Vec<SwitchCase>,
}

#[derive(Clone, Debug)]
pub struct SwitchCase {
    pub test: Option<Expression>,
    pub consequent: Vec<Statement>,
}

#[derive(Debug, Default)]
pub struct FunctionDecl {
    pub name: String,
    pub params: Vec<Pattern>,
    pub body: Vec<Statement>,
    pub is_async: bool,
    pub is_generator: bool,
    pub is_arrow: bool,
    pub is_strict: bool,
    pub source_text: Option<String>,
    annex_b_hoisted: Cell<bool>,
}

impl FunctionDecl {
    pub fn new(name: &str, params: Vec<Pattern>, body: Vec<Statement>) -> Self {
        Self {
            name: name.to_string(),
            params,
            body,
            ..Default::default()
        }
    }

    /// True when the parameter list has no rest element, patterns or initializers.
    pub fn has_simple_parameter_list(&self) -> bool {
        self.params.iter().all(|p| matches!(p, Pattern::Identifier(_)))
    }

    pub fn parameter_names(&self) -> Vec<String> {
        let mut names = Vec::new();
        for param in &self.params {
            param.for_each_bound_name(&mut |n| names.push(n.to_string()));
        }
        names
    }

    /// Formal parameter count used to size argument slots.
    pub fn formal_parameter_count(&self) -> usize {
        self.params
            .iter()
            .filter(|p| !matches!(p, Pattern::Rest(_)))
            .count()
    }

    /// ExpectedArgumentCount: parameters before the first initializer or rest element.
    pub fn expected_argument_count(&self) -> usize {
        self.params
            .iter()
            .take_while(|p| !matches!(p, Pattern::Assign(..) | Pattern::Rest(_)))
            .count()
    }

    /// Marks a block-level declaration whose evaluation must copy the block
    /// binding into the enclosing var scope.
    pub fn set_should_do_additional_annex_b_steps(&self) {
        self.annex_b_hoisted.set(true);
    }

    pub fn should_do_additional_annex_b_steps(&self) -> bool {
        self.annex_b_hoisted.get()
    }
}

#[derive(Clone, Debug)]
pub struct ClassDecl {
    pub name: String,
    pub super_class: Option<Box<Expression>>,
    pub source_text: Option<String>,
}

/// A lexically scoped declaration at the top level of a program.
#[derive(Clone, Copy, Debug)]
pub enum LexicalDeclaration<'a> {
    Variable(&'a VariableDeclaration),
    Class(&'a ClassDecl),
}

impl LexicalDeclaration<'_> {
    pub fn is_constant_declaration(&self) -> bool {
        match self {
            LexicalDeclaration::Variable(v) => {
                matches!(v.kind, VarKind::Const | VarKind::Using | VarKind::AwaitUsing)
            }
            LexicalDeclaration::Class(_) => false,
        }
    }

    pub fn for_each_bound_name(&self, f: &mut dyn FnMut(&str)) {
        match self {
            LexicalDeclaration::Variable(v) => v.for_each_bound_name(f),
            LexicalDeclaration::Class(c) => f(&c.name),
        }
    }
}

fn is_strict_mode_body(body: &[Statement]) -> bool {
    for stmt in body {
        if let Statement::Expression(Expression::Literal(Literal::String(s))) = stmt {
            if s == "use strict" {
                return true;
            }
        } else {
            break;
        }
    }
    false
}

/// Visits every statement that shares the var scope of `stmts`, without
/// descending into function bodies.
fn walk_var_scope<'a>(stmts: &'a [Statement], f: &mut dyn FnMut(&'a Statement)) {
    for stmt in stmts {
        walk_statement(stmt, f);
    }
}

fn walk_statement<'a>(stmt: &'a Statement, f: &mut dyn FnMut(&'a Statement)) {
    f(stmt);
    match stmt {
        Statement::Block(body) => walk_var_scope(body, f),
        Statement::If(s) => {
            walk_statement(&s.consequent, f);
            if let Some(alt) = &s.alternate {
                walk_statement(alt, f);
            }
        }
        Statement::While(s) | Statement::DoWhile(s) => walk_statement(&s.body, f),
        Statement::For(s) => walk_statement(&s.body, f),
        Statement::ForIn(s) | Statement::ForOf(s) => walk_statement(&s.body, f),
        Statement::Try(t) => {
            walk_var_scope(&t.block, f);
            if let Some(handler) = &t.handler {
                walk_var_scope(&handler.body, f);
            }
            if let Some(finalizer) = &t.finalizer {
                walk_var_scope(finalizer, f);
            }
        }
        Statement::Switch(s) => {
            for case in &s.cases {
                walk_var_scope(&case.consequent, f);
            }
        }
        Statement::Labeled(_, body) | Statement::With(_, body) => walk_statement(body, f),
        _ => {}
    }
}

fn var_declarations_of(stmt: &Statement) -> Option<&VariableDeclaration> {
    match stmt {
        Statement::Variable(decl) if decl.kind == VarKind::Var => Some(decl),
        Statement::For(ForStatement {
            init: Some(ForInit::Variable(decl)),
            ..
        }) if decl.kind == VarKind::Var => Some(decl),
        Statement::ForIn(ForInOfStatement {
            left: ForInOfLeft::Variable(decl),
            ..
        })
        | Statement::ForOf(ForInOfStatement {
            left: ForInOfLeft::Variable(decl),
            ..
        }) if decl.kind == VarKind::Var => Some(decl),
        _ => None,
    }
}

fn top_level_function(stmt: &Statement) -> Option<&Rc<FunctionDecl>> {
    match stmt {
        Statement::FunctionDeclaration(f) => Some(f),
        Statement::Labeled(_, inner) => top_level_function(inner),
        _ => None,
    }
}

impl Program {
    pub fn new(body: Vec<Statement>) -> Self {
        Self {
            source_type: SourceType::Script,
            body,
            strict: false,
        }
    }

    pub fn is_strict_mode(&self) -> bool {
        self.strict || is_strict_mode_body(&self.body)
    }

    /// VarDeclaredNames: var-bound names anywhere in the var scope, plus the
    /// names of top-level function declarations.
    pub fn for_each_var_declared_name(&self, f: &mut dyn FnMut(&str)) {
        walk_var_scope(&self.body, &mut |stmt| {
            if let Some(decl) = var_declarations_of(stmt) {
                decl.for_each_bound_name(f);
            }
        });
        for stmt in &self.body {
            if let Some(func) = top_level_function(stmt) {
                f(&func.name);
            }
        }
    }

    /// Top-level function declarations, last declaration first.
    pub fn for_each_var_function_declaration_in_reverse(&self, f: &mut dyn FnMut(&Rc<FunctionDecl>)) {
        for stmt in self.body.iter().rev() {
            if let Some(func) = top_level_function(stmt) {
                f(func);
            }
        }
    }

    pub fn for_each_var_scoped_variable_declaration(&self, f: &mut dyn FnMut(&VariableDeclaration)) {
        walk_var_scope(&self.body, &mut |stmt| {
            if let Some(decl) = var_declarations_of(stmt) {
                f(decl);
            }
        });
    }

    pub fn for_each_lexically_scoped_declaration(&self, f: &mut dyn FnMut(LexicalDeclaration<'_>)) {
        for stmt in &self.body {
            match stmt {
                Statement::Variable(decl) if decl.kind.is_lexical() => {
                    f(LexicalDeclaration::Variable(decl))
                }
                Statement::ClassDeclaration(class) => f(LexicalDeclaration::Class(class)),
                _ => {}
            }
        }
    }

    /// Plain function declarations nested directly in a block or switch
    /// clause whose replacement by `var` would not collide with an enclosing
    /// lexical declaration.
    pub fn for_each_annex_b_hoistable_function(&self, f: &mut dyn FnMut(&Rc<FunctionDecl>)) {
        let mut top_level_lexical = Vec::new();
        self.for_each_lexically_scoped_declaration(&mut |decl| {
            decl.for_each_bound_name(&mut |n| top_level_lexical.push(n.to_string()))
        });
        let mut scopes = vec![top_level_lexical];
        for stmt in &self.body {
            collect_annex_b_candidates(stmt, &mut scopes, f);
        }
    }
}

fn block_lexical_names<'a>(stmts: impl Iterator<Item = &'a Statement>) -> (Vec<String>, Vec<String>) {
    let mut lexical = Vec::new();
    let mut functions = Vec::new();
    for stmt in stmts {
        match stmt {
            Statement::Variable(decl) if decl.kind.is_lexical() => {
                decl.for_each_bound_name(&mut |n| lexical.push(n.to_string()))
            }
            Statement::ClassDeclaration(class) => lexical.push(class.name.clone()),
            Statement::FunctionDeclaration(func) => functions.push(func.name.clone()),
            _ => {}
        }
    }
    (lexical, functions)
}

fn visit_block_list<'a, I>(stmts: I, scopes: &mut Vec<Vec<String>>, f: &mut dyn FnMut(&Rc<FunctionDecl>))
where
    I: Iterator<Item = &'a Statement> + Clone,
{
    let (lexical, functions) = block_lexical_names(stmts.clone());
    for stmt in stmts.clone() {
        if let Statement::FunctionDeclaration(func) = stmt
            && !func.is_async
            && !func.is_generator
            && !lexical.contains(&func.name)
            && !scopes.iter().any(|scope| scope.contains(&func.name))
        {
            f(func);
        }
    }
    let mut scope = lexical;
    scope.extend(functions);
    scopes.push(scope);
    for stmt in stmts {
        collect_annex_b_candidates(stmt, scopes, f);
    }
    scopes.pop();
}

// B.3.4 FunctionDeclarations in IfStatement Statement Clauses
fn visit_if_clause(clause: &Statement, scopes: &mut Vec<Vec<String>>, f: &mut dyn FnMut(&Rc<FunctionDecl>)) {
    if matches!(clause, Statement::FunctionDeclaration(_)) {
        visit_block_list(std::iter::once(clause), scopes, f);
    } else {
        collect_annex_b_candidates(clause, scopes, f);
    }
}

/// Walks a loop body with the names bound by a `let`/`const` head in scope.
fn visit_loop_body(
    head: Option<&VariableDeclaration>,
    body: &Statement,
    scopes: &mut Vec<Vec<String>>,
    f: &mut dyn FnMut(&Rc<FunctionDecl>),
) {
    let Some(decl) = head.filter(|decl| decl.kind.is_lexical()) else {
        collect_annex_b_candidates(body, scopes, f);
        return;
    };
    let mut bound = Vec::new();
    decl.for_each_bound_name(&mut |n| bound.push(n.to_string()));
    scopes.push(bound);
    collect_annex_b_candidates(body, scopes, f);
    scopes.pop();
}

fn collect_annex_b_candidates(
    stmt: &Statement,
    scopes: &mut Vec<Vec<String>>,
    f: &mut dyn FnMut(&Rc<FunctionDecl>),
) {
    match stmt {
        Statement::Block(body) => visit_block_list(body.iter(), scopes, f),
        Statement::Switch(s) => {
            visit_block_list(s.cases.iter().flat_map(|case| case.consequent.iter()), scopes, f)
        }
        Statement::If(s) => {
            visit_if_clause(&s.consequent, scopes, f);
            if let Some(alt) = &s.alternate {
                visit_if_clause(alt, scopes, f);
            }
        }
        Statement::While(s) | Statement::DoWhile(s) => collect_annex_b_candidates(&s.body, scopes, f),
        Statement::For(s) => {
            let head = match &s.init {
                Some(ForInit::Variable(decl)) => Some(decl),
                _ => None,
            };
            visit_loop_body(head, &s.body, scopes, f);
        }
        Statement::ForIn(s) | Statement::ForOf(s) => {
            let head = match &s.left {
                ForInOfLeft::Variable(decl) => Some(decl),
                ForInOfLeft::Pattern(_) => None,
            };
            visit_loop_body(head, &s.body, scopes, f);
        }
        Statement::Try(t) => {
            visit_block_list(t.block.iter(), scopes, f);
            if let Some(handler) = &t.handler {
                visit_block_list(handler.body.iter(), scopes, f);
            }
            if let Some(finalizer) = &t.finalizer {
                visit_block_list(finalizer.iter(), scopes, f);
            }
        }
        Statement::Labeled(_, body) | Statement::With(_, body) => {
            collect_annex_b_candidates(body, scopes, f)
        }
        _ => {}
    }
}
