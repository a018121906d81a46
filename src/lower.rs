//! Lowering from the oxc AST to the runtime IR.
//!
//! The transformed body is parsed with `oxc_parser` and walked once. Anything
//! outside the supported subset becomes `CompileError::Unsupported` so the
//! executor can show it as an error-display unit instead of misbehaving.

use oxc_allocator::Allocator;
use oxc_ast::ast::*;
use oxc_parser::Parser;
use oxc_span::SourceType;
use std::rc::Rc;
use tracing::trace;

use crate::ast::{
    ArrayItem, AssignOp, AssignTarget, AttributeItem, BinaryOp, ChildItem, DeclKind, ElementDef,
    ElementTag, Expr, FunctionDef, Literal, LogicalOp, MemberProperty, ObjectItem, Pattern,
    Program, PropertyName, Stmt, UnaryOp,
};
use crate::error::CompileError;
use crate::scope::collect_free_identifiers;
use crate::value::format_number;

type LowerResult<T> = Result<T, CompileError>;

fn unsupported<T>(what: &str) -> LowerResult<T> {
    Err(CompileError::Unsupported(what.to_string()))
}

// ═══════════════════════════════════════════════════════════════════════════════
// ENTRY POINT
// ═══════════════════════════════════════════════════════════════════════════════

/// Parse and lower a complete unit.
pub fn compile_program(source: &str) -> LowerResult<Program> {
    let allocator = Allocator::default();
    let source_type = SourceType::default()
        .with_typescript(true)
        .with_module(true)
        .with_jsx(true);
    let ret = Parser::new(&allocator, source, source_type).parse();

    if !ret.errors.is_empty() {
        let message = ret
            .errors
            .iter()
            .map(|error| error.to_string())
            .collect::<Vec<_>>()
            .join("; ");
        return Err(CompileError::Parse(message));
    }

    let free_identifiers = collect_free_identifiers(&ret.program);
    trace!(?free_identifiers, "lowering unit");
    let body = lower_statements(&ret.program.body)?;

    Ok(Program {
        body,
        free_identifiers,
    })
}

// ═══════════════════════════════════════════════════════════════════════════════
// STATEMENTS
// ═══════════════════════════════════════════════════════════════════════════════

fn lower_statements(statements: &[Statement<'_>]) -> LowerResult<Vec<Stmt>> {
    let mut out = Vec::with_capacity(statements.len());
    for stmt in statements {
        out.extend(lower_statement(stmt)?);
    }
    Ok(out)
}

fn lower_statement(stmt: &Statement<'_>) -> LowerResult<Vec<Stmt>> {
    let lowered = match stmt {
        Statement::VariableDeclaration(decl) => return lower_variable_declaration(decl),
        Statement::FunctionDeclaration(func) => Stmt::Function(lower_function(func, false)?),
        Statement::ReturnStatement(ret) => {
            Stmt::Return(ret.argument.as_ref().map(lower_expression).transpose()?)
        }
        Statement::IfStatement(if_stmt) => Stmt::If {
            test: lower_expression(&if_stmt.test)?,
            consequent: Box::new(lower_single(&if_stmt.consequent)?),
            alternate: match &if_stmt.alternate {
                Some(alt) => Some(Box::new(lower_single(alt)?)),
                None => None,
            },
        },
        Statement::BlockStatement(block) => Stmt::Block(lower_statements(&block.body)?),
        Statement::ExpressionStatement(expr_stmt) => {
            Stmt::Expression(lower_expression(&expr_stmt.expression)?)
        }
        Statement::ForOfStatement(for_of) => {
            let (kind, pattern) = match &for_of.left {
                ForStatementLeft::VariableDeclaration(decl) => {
                    let declarator = decl
                        .declarations
                        .first()
                        .ok_or_else(|| CompileError::Unsupported("empty for-of binding".into()))?;
                    (
                        lower_declaration_kind(decl.kind),
                        lower_binding_pattern(&declarator.id)?,
                    )
                }
                _ => return unsupported("for-of over an existing binding"),
            };
            Stmt::ForOf {
                kind,
                pattern,
                iterable: lower_expression(&for_of.right)?,
                body: Box::new(lower_single(&for_of.body)?),
            }
        }
        Statement::ForStatement(for_stmt) => {
            let init = match &for_stmt.init {
                Some(ForStatementInit::VariableDeclaration(decl)) => {
                    Some(Box::new(Stmt::Block(lower_variable_declaration(decl)?)))
                }
                Some(init) => match init.as_expression() {
                    Some(expr) => Some(Box::new(Stmt::Expression(lower_expression(expr)?))),
                    None => return unsupported("for loop initialiser"),
                },
                None => None,
            };
            Stmt::For {
                init,
                test: for_stmt.test.as_ref().map(lower_expression).transpose()?,
                update: for_stmt.update.as_ref().map(lower_expression).transpose()?,
                body: Box::new(lower_single(&for_stmt.body)?),
            }
        }
        Statement::ThrowStatement(throw) => Stmt::Throw(lower_expression(&throw.argument)?),
        Statement::TryStatement(try_stmt) => {
            let (param, handler) = match &try_stmt.handler {
                Some(clause) => (
                    match &clause.param {
                        Some(param) => Some(lower_binding_pattern(&param.pattern)?),
                        None => None,
                    },
                    Some(lower_statements(&clause.body.body)?),
                ),
                None => (None, None),
            };
            Stmt::Try {
                block: lower_statements(&try_stmt.block.body)?,
                param,
                handler,
                finalizer: match &try_stmt.finalizer {
                    Some(block) => Some(lower_statements(&block.body)?),
                    None => None,
                },
            }
        }
        Statement::BreakStatement(_) => Stmt::Break,
        Statement::ContinueStatement(_) => Stmt::Continue,
        Statement::EmptyStatement(_) => Stmt::Empty,
        Statement::ExportNamedDeclaration(export) => match &export.declaration {
            Some(Declaration::VariableDeclaration(decl)) => {
                return lower_variable_declaration(decl)
            }
            Some(Declaration::FunctionDeclaration(func)) => {
                Stmt::Function(lower_function(func, false)?)
            }
            Some(_) => return unsupported("exported declaration kind"),
            // `export { a, b }` re-lists names that are already declared.
            None => Stmt::Empty,
        },
        Statement::ExportDefaultDeclaration(export) => {
            return lower_export_default(&export.declaration)
        }
        // Type-only declarations have no runtime meaning.
        Statement::TSTypeAliasDeclaration(_) | Statement::TSInterfaceDeclaration(_) => Stmt::Empty,
        Statement::ImportDeclaration(_) => {
            return unsupported("import declarations; bindings are injected by the environment")
        }
        Statement::ClassDeclaration(_) => return unsupported("class declarations"),
        Statement::WhileStatement(_) | Statement::DoWhileStatement(_) => {
            return unsupported("while loops")
        }
        Statement::SwitchStatement(_) => return unsupported("switch statements"),
        _ => return unsupported("statement kind"),
    };
    Ok(vec![lowered])
}

/// `export default ...` binds the exported value to the name `default`.
fn lower_export_default(declaration: &ExportDefaultDeclarationKind<'_>) -> LowerResult<Vec<Stmt>> {
    let bind_default = |init: Expr| Stmt::Declare {
        kind: DeclKind::Const,
        pattern: Pattern::Identifier("default".to_string()),
        init: Some(init),
    };
    match declaration {
        ExportDefaultDeclarationKind::FunctionDeclaration(func) => {
            let def = lower_function(func, false)?;
            match def.name.clone() {
                Some(name) => Ok(vec![
                    Stmt::Function(def),
                    bind_default(Expr::Identifier(name)),
                ]),
                None => Ok(vec![bind_default(Expr::Function(def))]),
            }
        }
        ExportDefaultDeclarationKind::ClassDeclaration(_) => unsupported("class declarations"),
        ExportDefaultDeclarationKind::TSInterfaceDeclaration(_) => Ok(vec![Stmt::Empty]),
        other => match other.as_expression() {
            Some(expr) => Ok(vec![bind_default(lower_expression(expr)?)]),
            None => unsupported("default export kind"),
        },
    }
}

/// Lower a statement that must stay a single node (loop and branch bodies).
fn lower_single(stmt: &Statement<'_>) -> LowerResult<Stmt> {
    let mut lowered = lower_statement(stmt)?;
    if lowered.len() == 1 {
        Ok(lowered.remove(0))
    } else {
        Ok(Stmt::Block(lowered))
    }
}

fn lower_declaration_kind(kind: VariableDeclarationKind) -> DeclKind {
    match kind {
        VariableDeclarationKind::Const => DeclKind::Const,
        VariableDeclarationKind::Var => DeclKind::Var,
        _ => DeclKind::Let,
    }
}

fn lower_variable_declaration(decl: &VariableDeclaration<'_>) -> LowerResult<Vec<Stmt>> {
    let kind = lower_declaration_kind(decl.kind);
    decl.declarations
        .iter()
        .map(|declarator| {
            Ok(Stmt::Declare {
                kind,
                pattern: lower_binding_pattern(&declarator.id)?,
                init: declarator.init.as_ref().map(lower_expression).transpose()?,
            })
        })
        .collect()
}

fn lower_binding_pattern(pattern: &BindingPattern<'_>) -> LowerResult<Pattern> {
    match pattern {
        BindingPattern::BindingIdentifier(id) => Ok(Pattern::Identifier(id.name.to_string())),
        BindingPattern::ObjectPattern(obj) => {
            let mut properties = Vec::with_capacity(obj.properties.len());
            for prop in &obj.properties {
                properties.push((
                    lower_property_key(&prop.key, prop.computed)?,
                    lower_binding_pattern(&prop.value)?,
                ));
            }
            let rest = match &obj.rest {
                Some(rest) => Some(Box::new(lower_binding_pattern(&rest.argument)?)),
                None => None,
            };
            Ok(Pattern::Object { properties, rest })
        }
        BindingPattern::ArrayPattern(arr) => {
            let mut elements = Vec::with_capacity(arr.elements.len());
            for elem in &arr.elements {
                elements.push(match elem {
                    Some(pattern) => Some(lower_binding_pattern(pattern)?),
                    None => None,
                });
            }
            let rest = match &arr.rest {
                Some(rest) => Some(Box::new(lower_binding_pattern(&rest.argument)?)),
                None => None,
            };
            Ok(Pattern::Array { elements, rest })
        }
        BindingPattern::AssignmentPattern(assign) => Ok(Pattern::Default {
            target: Box::new(lower_binding_pattern(&assign.left)?),
            default: lower_expression(&assign.right)?,
        }),
    }
}

fn lower_function(func: &Function<'_>, _is_expression: bool) -> LowerResult<Rc<FunctionDef>> {
    let params = func
        .params
        .items
        .iter()
        .map(|param| lower_binding_pattern(&param.pattern))
        .collect::<LowerResult<Vec<_>>>()?;
    let body = match &func.body {
        Some(body) => lower_statements(&body.statements)?,
        None => Vec::new(),
    };
    Ok(Rc::new(FunctionDef {
        name: func.id.as_ref().map(|id| id.name.to_string()),
        params,
        body,
        arrow: false,
    }))
}

fn lower_arrow(arrow: &ArrowFunctionExpression<'_>) -> LowerResult<Rc<FunctionDef>> {
    let params = arrow
        .params
        .items
        .iter()
        .map(|param| lower_binding_pattern(&param.pattern))
        .collect::<LowerResult<Vec<_>>>()?;

    // A concise body is stored as a single expression statement.
    let body = if arrow.expression {
        match arrow.body.statements.first() {
            Some(Statement::ExpressionStatement(expr_stmt)) => {
                vec![Stmt::Return(Some(lower_expression(&expr_stmt.expression)?))]
            }
            _ => lower_statements(&arrow.body.statements)?,
        }
    } else {
        lower_statements(&arrow.body.statements)?
    };

    Ok(Rc::new(FunctionDef {
        name: None,
        params,
        body,
        arrow: true,
    }))
}

// ═══════════════════════════════════════════════════════════════════════════════
// EXPRESSIONS
// ═══════════════════════════════════════════════════════════════════════════════

fn lower_expression(expr: &Expression<'_>) -> LowerResult<Expr> {
    let lowered = match expr {
        Expression::BooleanLiteral(lit) => Expr::Literal(Literal::Bool(lit.value)),
        Expression::NullLiteral(_) => Expr::Literal(Literal::Null),
        Expression::NumericLiteral(lit) => Expr::Literal(Literal::Number(lit.value)),
        Expression::StringLiteral(lit) => Expr::Literal(Literal::String(Rc::from(lit.value.as_str()))),
        Expression::TemplateLiteral(tpl) => Expr::Template {
            quasis: tpl
                .quasis
                .iter()
                .map(|quasi| match &quasi.value.cooked {
                    Some(cooked) => cooked.to_string(),
                    None => quasi.value.raw.to_string(),
                })
                .collect(),
            expressions: tpl
                .expressions
                .iter()
                .map(lower_expression)
                .collect::<LowerResult<Vec<_>>>()?,
        },
        Expression::Identifier(id) => {
            if id.name == "undefined" {
                Expr::Literal(Literal::Undefined)
            } else {
                Expr::Identifier(id.name.to_string())
            }
        }
        Expression::ArrayExpression(arr) => {
            let mut items = Vec::with_capacity(arr.elements.len());
            for elem in &arr.elements {
                items.push(match elem {
                    ArrayExpressionElement::SpreadElement(spread) => {
                        ArrayItem::Spread(lower_expression(&spread.argument)?)
                    }
                    ArrayExpressionElement::Elision(_) => ArrayItem::Hole,
                    _ => match elem.as_expression() {
                        Some(e) => ArrayItem::Expr(lower_expression(e)?),
                        None => return unsupported("array element"),
                    },
                });
            }
            Expr::Array(items)
        }
        Expression::ObjectExpression(obj) => {
            let mut items = Vec::with_capacity(obj.properties.len());
            for prop in &obj.properties {
                items.push(match prop {
                    ObjectPropertyKind::ObjectProperty(p) => {
                        if !matches!(p.kind, PropertyKind::Init) {
                            return unsupported("object getters and setters");
                        }
                        ObjectItem::Property {
                            key: lower_property_key(&p.key, p.computed)?,
                            value: lower_expression(&p.value)?,
                        }
                    }
                    ObjectPropertyKind::SpreadProperty(spread) => {
                        ObjectItem::Spread(lower_expression(&spread.argument)?)
                    }
                });
            }
            Expr::Object(items)
        }
        Expression::FunctionExpression(func) => Expr::Function(lower_function(func, true)?),
        Expression::ArrowFunctionExpression(arrow) => Expr::Function(lower_arrow(arrow)?),
        Expression::CallExpression(call) => lower_call(call)?,
        Expression::NewExpression(new_expr) => Expr::Call {
            callee: Box::new(lower_expression(&new_expr.callee)?),
            arguments: lower_arguments(&new_expr.arguments)?,
            optional: false,
        },
        Expression::StaticMemberExpression(member) => lower_static_member(member)?,
        Expression::ComputedMemberExpression(member) => lower_computed_member(member)?,
        Expression::ChainExpression(chain) => {
            let inner = match &chain.expression {
                ChainElement::CallExpression(call) => lower_call(call)?,
                ChainElement::StaticMemberExpression(member) => lower_static_member(member)?,
                ChainElement::ComputedMemberExpression(member) => lower_computed_member(member)?,
                _ => return unsupported("optional chain element"),
            };
            Expr::Chain(Box::new(inner))
        }
        Expression::UnaryExpression(unary) => {
            let operator = match unary.operator.as_str() {
                "!" => UnaryOp::Not,
                "-" => UnaryOp::Negate,
                "+" => UnaryOp::Plus,
                "typeof" => UnaryOp::TypeOf,
                "void" => UnaryOp::Void,
                "~" => UnaryOp::BitNot,
                other => return unsupported(&format!("unary operator `{}`", other)),
            };
            Expr::Unary {
                operator,
                argument: Box::new(lower_expression(&unary.argument)?),
            }
        }
        Expression::BinaryExpression(bin) => Expr::Binary {
            operator: lower_binary_operator(bin.operator.as_str())?,
            left: Box::new(lower_expression(&bin.left)?),
            right: Box::new(lower_expression(&bin.right)?),
        },
        Expression::LogicalExpression(logical) => Expr::Logical {
            operator: match logical.operator.as_str() {
                "&&" => LogicalOp::And,
                "||" => LogicalOp::Or,
                _ => LogicalOp::Coalesce,
            },
            left: Box::new(lower_expression(&logical.left)?),
            right: Box::new(lower_expression(&logical.right)?),
        },
        Expression::ConditionalExpression(cond) => Expr::Conditional {
            test: Box::new(lower_expression(&cond.test)?),
            consequent: Box::new(lower_expression(&cond.consequent)?),
            alternate: Box::new(lower_expression(&cond.alternate)?),
        },
        Expression::AssignmentExpression(assign) => {
            let operator = match assign.operator.as_str() {
                "=" => AssignOp::Assign,
                "&&=" => AssignOp::LogicalAnd,
                "||=" => AssignOp::LogicalOr,
                "??=" => AssignOp::Coalesce,
                compound => {
                    let binary = compound.trim_end_matches('=');
                    AssignOp::Compound(lower_binary_operator(binary)?)
                }
            };
            let target = match &assign.left {
                AssignmentTarget::AssignmentTargetIdentifier(id) => {
                    AssignTarget::Identifier(id.name.to_string())
                }
                AssignmentTarget::StaticMemberExpression(member) => AssignTarget::Member {
                    object: Box::new(lower_expression(&member.object)?),
                    property: MemberProperty::Static(member.property.name.to_string()),
                },
                AssignmentTarget::ComputedMemberExpression(member) => AssignTarget::Member {
                    object: Box::new(lower_expression(&member.object)?),
                    property: MemberProperty::Computed(Box::new(lower_expression(
                        &member.expression,
                    )?)),
                },
                _ => return unsupported("destructuring assignment"),
            };
            Expr::Assign {
                operator,
                target,
                value: Box::new(lower_expression(&assign.right)?),
            }
        }
        Expression::UpdateExpression(update) => {
            let target = match &update.argument {
                SimpleAssignmentTarget::AssignmentTargetIdentifier(id) => {
                    AssignTarget::Identifier(id.name.to_string())
                }
                SimpleAssignmentTarget::StaticMemberExpression(member) => AssignTarget::Member {
                    object: Box::new(lower_expression(&member.object)?),
                    property: MemberProperty::Static(member.property.name.to_string()),
                },
                SimpleAssignmentTarget::ComputedMemberExpression(member) => AssignTarget::Member {
                    object: Box::new(lower_expression(&member.object)?),
                    property: MemberProperty::Computed(Box::new(lower_expression(
                        &member.expression,
                    )?)),
                },
                _ => return unsupported("update target"),
            };
            Expr::Update {
                increment: update.operator.as_str() == "++",
                prefix: update.prefix,
                target,
            }
        }
        Expression::SequenceExpression(seq) => Expr::Sequence(
            seq.expressions
                .iter()
                .map(lower_expression)
                .collect::<LowerResult<Vec<_>>>()?,
        ),
        Expression::ParenthesizedExpression(paren) => lower_expression(&paren.expression)?,
        Expression::JSXElement(element) => Expr::Element(Rc::new(lower_jsx_element(element)?)),
        Expression::JSXFragment(fragment) => Expr::Element(Rc::new(ElementDef {
            tag: ElementTag::Fragment,
            attributes: Vec::new(),
            children: lower_jsx_children(&fragment.children)?,
        })),
        // Type-level wrappers carry no runtime meaning.
        Expression::TSAsExpression(e) => lower_expression(&e.expression)?,
        Expression::TSNonNullExpression(e) => lower_expression(&e.expression)?,
        Expression::TSSatisfiesExpression(e) => lower_expression(&e.expression)?,
        Expression::AwaitExpression(_) => return unsupported("await"),
        Expression::ClassExpression(_) => return unsupported("class expressions"),
        _ => return unsupported("expression kind"),
    };
    Ok(lowered)
}

fn lower_binary_operator(op: &str) -> LowerResult<BinaryOp> {
    Ok(match op {
        "+" => BinaryOp::Add,
        "-" => BinaryOp::Sub,
        "*" => BinaryOp::Mul,
        "/" => BinaryOp::Div,
        "%" => BinaryOp::Rem,
        "**" => BinaryOp::Pow,
        "==" => BinaryOp::Eq,
        "!=" => BinaryOp::NotEq,
        "===" => BinaryOp::StrictEq,
        "!==" => BinaryOp::StrictNotEq,
        "<" => BinaryOp::Lt,
        "<=" => BinaryOp::LtEq,
        ">" => BinaryOp::Gt,
        ">=" => BinaryOp::GtEq,
        "&" => BinaryOp::BitAnd,
        "|" => BinaryOp::BitOr,
        "^" => BinaryOp::BitXor,
        "<<" => BinaryOp::Shl,
        ">>" => BinaryOp::Shr,
        ">>>" => BinaryOp::UShr,
        "in" => BinaryOp::In,
        other => return unsupported(&format!("binary operator `{}`", other)),
    })
}

fn lower_call(call: &CallExpression<'_>) -> LowerResult<Expr> {
    Ok(Expr::Call {
        callee: Box::new(lower_expression(&call.callee)?),
        arguments: lower_arguments(&call.arguments)?,
        optional: call.optional,
    })
}

fn lower_arguments(arguments: &[Argument<'_>]) -> LowerResult<Vec<ArrayItem>> {
    let mut out = Vec::with_capacity(arguments.len());
    for arg in arguments {
        out.push(match arg {
            Argument::SpreadElement(spread) => ArrayItem::Spread(lower_expression(&spread.argument)?),
            _ => match arg.as_expression() {
                Some(e) => ArrayItem::Expr(lower_expression(e)?),
                None => return unsupported("call argument"),
            },
        });
    }
    Ok(out)
}

fn lower_static_member(member: &StaticMemberExpression<'_>) -> LowerResult<Expr> {
    Ok(Expr::Member {
        object: Box::new(lower_expression(&member.object)?),
        property: MemberProperty::Static(member.property.name.to_string()),
        optional: member.optional,
    })
}

fn lower_computed_member(member: &ComputedMemberExpression<'_>) -> LowerResult<Expr> {
    Ok(Expr::Member {
        object: Box::new(lower_expression(&member.object)?),
        property: MemberProperty::Computed(Box::new(lower_expression(&member.expression)?)),
        optional: member.optional,
    })
}

fn lower_property_key(key: &PropertyKey<'_>, computed: bool) -> LowerResult<PropertyName> {
    if let PropertyKey::StaticIdentifier(id) = key {
        return Ok(PropertyName::Static(id.name.to_string()));
    }
    let expr = match key.as_expression() {
        Some(expr) => expr,
        None => return unsupported("private property key"),
    };
    if !computed {
        match expr {
            Expression::StringLiteral(lit) => return Ok(PropertyName::Static(lit.value.to_string())),
            Expression::NumericLiteral(lit) => {
                return Ok(PropertyName::Static(format_number(lit.value)))
            }
            _ => {}
        }
    }
    Ok(PropertyName::Computed(lower_expression(expr)?))
}

// ═══════════════════════════════════════════════════════════════════════════════
// JSX
// ═══════════════════════════════════════════════════════════════════════════════

fn lower_jsx_element(element: &JSXElement<'_>) -> LowerResult<ElementDef> {
    let tag = lower_jsx_tag(&element.opening_element.name)?;

    let mut attributes = Vec::with_capacity(element.opening_element.attributes.len());
    for item in &element.opening_element.attributes {
        attributes.push(match item {
            JSXAttributeItem::Attribute(attr) => {
                let name = match &attr.name {
                    JSXAttributeName::Identifier(id) => id.name.to_string(),
                    JSXAttributeName::NamespacedName(ns) => {
                        format!("{}:{}", ns.namespace.name, ns.name.name)
                    }
                };
                let value = match &attr.value {
                    Some(JSXAttributeValue::StringLiteral(s)) => {
                        Expr::Literal(Literal::String(Rc::from(s.value.as_str())))
                    }
                    Some(JSXAttributeValue::ExpressionContainer(container)) => {
                        match container.expression.as_expression() {
                            Some(e) => lower_expression(e)?,
                            None => Expr::Literal(Literal::Undefined),
                        }
                    }
                    Some(JSXAttributeValue::Element(el)) => {
                        Expr::Element(Rc::new(lower_jsx_element(el)?))
                    }
                    Some(JSXAttributeValue::Fragment(frag)) => Expr::Element(Rc::new(ElementDef {
                        tag: ElementTag::Fragment,
                        attributes: Vec::new(),
                        children: lower_jsx_children(&frag.children)?,
                    })),
                    // A bare attribute means `true`.
                    None => Expr::Literal(Literal::Bool(true)),
                };
                AttributeItem::Named { name, value }
            }
            JSXAttributeItem::SpreadAttribute(spread) => {
                AttributeItem::Spread(lower_expression(&spread.argument)?)
            }
        });
    }

    Ok(ElementDef {
        tag,
        attributes,
        children: lower_jsx_children(&element.children)?,
    })
}

fn lower_jsx_tag(name: &JSXElementName<'_>) -> LowerResult<ElementTag> {
    let tag = match name {
        JSXElementName::Identifier(id) => tag_for_name(id.name.as_str()),
        JSXElementName::IdentifierReference(id) => tag_for_name(id.name.as_str()),
        JSXElementName::NamespacedName(ns) => {
            ElementTag::Intrinsic(format!("{}:{}", ns.namespace.name, ns.name.name))
        }
        JSXElementName::MemberExpression(member) => {
            ElementTag::Component(lower_jsx_member(member)?)
        }
        JSXElementName::ThisExpression(_) => return unsupported("`this` as a tag"),
    };
    Ok(tag)
}

fn tag_for_name(name: &str) -> ElementTag {
    if name.starts_with(|c: char| c.is_ascii_lowercase()) {
        ElementTag::Intrinsic(name.to_string())
    } else {
        ElementTag::Component(Expr::Identifier(name.to_string()))
    }
}

fn lower_jsx_member(member: &JSXMemberExpression<'_>) -> LowerResult<Expr> {
    let object = match &member.object {
        JSXMemberExpressionObject::IdentifierReference(id) => Expr::Identifier(id.name.to_string()),
        JSXMemberExpressionObject::MemberExpression(inner) => lower_jsx_member(inner)?,
        _ => return unsupported("`this` in a member tag"),
    };
    Ok(Expr::Member {
        object: Box::new(object),
        property: MemberProperty::Static(member.property.name.to_string()),
        optional: false,
    })
}

fn lower_jsx_children(children: &[JSXChild<'_>]) -> LowerResult<Vec<ChildItem>> {
    let mut out = Vec::with_capacity(children.len());
    for child in children {
        match child {
            JSXChild::Text(text) => {
                let normalized = normalize_jsx_text(text.value.as_str());
                if !normalized.is_empty() {
                    out.push(ChildItem::Text(normalized));
                }
            }
            JSXChild::Element(el) => {
                out.push(ChildItem::Expr(Expr::Element(Rc::new(lower_jsx_element(el)?))))
            }
            JSXChild::Fragment(frag) => out.push(ChildItem::Expr(Expr::Element(Rc::new(
                ElementDef {
                    tag: ElementTag::Fragment,
                    attributes: Vec::new(),
                    children: lower_jsx_children(&frag.children)?,
                },
            )))),
            JSXChild::ExpressionContainer(container) => {
                // `{/* comment */}` is an empty expression and renders nothing.
                if let Some(e) = container.expression.as_expression() {
                    out.push(ChildItem::Expr(lower_expression(e)?));
                }
            }
            JSXChild::Spread(spread) => out.push(ChildItem::Spread(lower_expression(&spread.expression)?)),
        }
    }
    Ok(out)
}

/// JSX whitespace rules: lines are trimmed where they meet a line break,
/// blank lines vanish, and the surviving lines are joined by one space.
pub fn normalize_jsx_text(raw: &str) -> String {
    let lines: Vec<&str> = raw.split('\n').collect();
    let last = lines.len().saturating_sub(1);
    let last_non_empty = lines
        .iter()
        .rposition(|line| !line.trim().is_empty())
        .unwrap_or(0);

    let mut out = String::new();
    for (i, line) in lines.iter().enumerate() {
        let line = line.trim_end_matches('\r').replace('\t', " ");
        let mut trimmed: &str = &line;
        if i != 0 {
            trimmed = trimmed.trim_start();
        }
        if i != last {
            trimmed = trimmed.trim_end();
        }
        if trimmed.is_empty() {
            continue;
        }
        out.push_str(trimmed);
        if i != last_non_empty {
            out.push(' ');
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_jsx_text() {
        assert_eq!(normalize_jsx_text("  Hello  "), "  Hello  ");
        assert_eq!(normalize_jsx_text("\n    Patient\n    name\n  "), "Patient name");
        assert_eq!(normalize_jsx_text("\n   \n"), "");
    }

    #[test]
    fn test_lowering_reports_parse_errors() {
        let err = compile_program("const = ;").unwrap_err();
        assert!(matches!(err, CompileError::Parse(_)));
    }

    #[test]
    fn test_lowering_rejects_classes() {
        let err = compile_program("class Intake {}").unwrap_err();
        assert!(matches!(err, CompileError::Unsupported(_)));
    }

    #[test]
    fn test_declared_names_cover_patterns() {
        let program =
            compile_program("const { a, b: [c] } = x; function Field() {} export const Form = 1;")
                .unwrap();
        assert_eq!(program.declared_names(), vec!["a", "c", "Field", "Form"]);
    }

    #[test]
    fn test_free_identifiers_are_collected() {
        let program = compile_program("const local = 1; const f = () => Missing(local);").unwrap();
        assert!(program.free_identifiers.contains(&"Missing".to_string()));
        assert!(!program.free_identifiers.contains(&"local".to_string()));
    }
}
