//! Typed program model consumed by the analysis
//!
//! The parser and the declared-type checker are separate collaborators. What they
//! hand over is this model: function and shape declarations addressed by dense ids,
//! plus statements and expressions annotated with the checker's declared types.
//!
//! Everything here is plain data and (de)serializes with `serde`, so tools can load
//! a program from JSON without linking a parser.

use serde::{Deserialize, Serialize};

/// Identity of a function declaration site
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FunctionId(pub u32);

impl FunctionId {
    /// Position in the owning table
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Identity of a declared object shape (instance, prototype, interface or record type)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ShapeId(pub u32);

impl ShapeId {
    /// Position in the owning table
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Static type supplied by the declared-type checker
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum DeclaredType {
    /// The checker could not determine a type
    #[default]
    Unknown,
    /// Any non-object value (number, string, boolean, null, undefined)
    Primitive,
    /// The generic object type; not mappable to any particular shape
    AnyObject,
    /// A nominal object shape
    Object(ShapeId),
    /// A function type, tied to a declaration when the checker knows which one
    Function {
        #[serde(default)]
        decl: Option<FunctionId>,
        #[serde(default)]
        signature: Option<Box<FunctionSignature>>,
    },
    /// Any of the member types
    Union(Vec<DeclaredType>),
}

impl DeclaredType {
    /// Whether the checker gave up on this expression
    pub fn is_unknown(&self) -> bool {
        matches!(self, DeclaredType::Unknown)
    }

    /// Function type of a known declaration
    pub fn function(decl: FunctionId) -> Self {
        DeclaredType::Function {
            decl: Some(decl),
            signature: None,
        }
    }

    /// Anonymous function type with a signature, as used for callback parameters
    pub fn callback(signature: FunctionSignature) -> Self {
        DeclaredType::Function {
            decl: None,
            signature: Some(Box::new(signature)),
        }
    }

    /// The signature of a function type, if the checker supplied one
    pub fn signature(&self) -> Option<&FunctionSignature> {
        match self {
            DeclaredType::Function { signature, .. } => signature.as_deref(),
            _ => None,
        }
    }
}

/// Declared parameter, receiver and return types of a function
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct FunctionSignature {
    /// Declared parameter types, by position
    #[serde(default)]
    pub params: Vec<DeclaredType>,
    /// Declared receiver type
    #[serde(default)]
    pub this_type: Option<DeclaredType>,
    /// Declared return type
    #[serde(default)]
    pub ret: DeclaredType,
}

impl FunctionSignature {
    /// Signature with no declared receiver
    pub fn new(params: Vec<DeclaredType>, ret: DeclaredType) -> Self {
        Self {
            params,
            this_type: None,
            ret,
        }
    }

    /// Set the declared receiver type
    pub fn with_this(mut self, this_type: DeclaredType) -> Self {
        self.this_type = Some(this_type);
        self
    }
}

/// What kind of object a shape describes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ShapeKind {
    /// Objects created by a constructor
    Instance,
    /// The prototype object of a constructor
    Prototype,
    /// Structural or nominal interface; never instantiated directly
    Interface,
    /// Object literal type
    Record,
}

/// A declared object shape
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShapeDecl {
    /// Display name
    pub name: String,
    /// Kind of object described
    pub kind: ShapeKind,
    /// Own property names
    #[serde(default)]
    pub properties: Vec<String>,
    /// Prototype link: the shape whose properties this one inherits
    #[serde(default)]
    pub implicit_prototype: Option<ShapeId>,
    /// Shapes that directly extend this one
    #[serde(default)]
    pub subtypes: Vec<ShapeId>,
    /// Constructors whose instances implement this interface
    #[serde(default)]
    pub implementors: Vec<FunctionId>,
}

impl ShapeDecl {
    /// Shape with no properties or relations
    pub fn new(name: impl Into<String>, kind: ShapeKind) -> Self {
        Self {
            name: name.into(),
            kind,
            properties: Vec::new(),
            implicit_prototype: None,
            subtypes: Vec::new(),
            implementors: Vec::new(),
        }
    }

    /// Shape of objects created by a constructor
    pub fn instance(name: impl Into<String>) -> Self {
        Self::new(name, ShapeKind::Instance)
    }

    /// Shape of an object literal
    pub fn record(name: impl Into<String>) -> Self {
        Self::new(name, ShapeKind::Record)
    }

    /// Interface shape; implementors are attached separately
    pub fn interface(name: impl Into<String>) -> Self {
        Self::new(name, ShapeKind::Interface)
    }

    /// Add own property names
    pub fn with_properties<I, S>(mut self, properties: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.properties.extend(properties.into_iter().map(Into::into));
        self
    }

    /// Set the prototype link
    pub fn with_prototype(mut self, prototype: ShapeId) -> Self {
        self.implicit_prototype = Some(prototype);
        self
    }

    /// Set the implementing constructors
    pub fn with_implementors(mut self, implementors: Vec<FunctionId>) -> Self {
        self.implementors = implementors;
        self
    }
}

/// A function declaration site. Extern declarations have no body.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FunctionDecl {
    /// `None` for anonymous function expressions
    #[serde(default)]
    pub name: Option<String>,
    /// Formal parameter names
    #[serde(default)]
    pub params: Vec<String>,
    /// `None` for extern declarations
    #[serde(default)]
    pub body: Option<Vec<Stmt>>,
    /// Declared signature; only extern declarations rely on it
    #[serde(default)]
    pub signature: FunctionSignature,
    /// Shape of the objects `new` creates with this function
    #[serde(default)]
    pub instance_shape: Option<ShapeId>,
    /// Shape of `F.prototype`
    #[serde(default)]
    pub prototype_shape: Option<ShapeId>,
    /// Constructor this one inherits from
    #[serde(default)]
    pub superclass: Option<FunctionId>,
}

impl FunctionDecl {
    /// Function with a body and no declared signature
    pub fn new(name: Option<&str>, params: &[&str], body: Vec<Stmt>) -> Self {
        Self {
            name: name.map(str::to_string),
            params: params.iter().map(|p| p.to_string()).collect(),
            body: Some(body),
            ..Self::default()
        }
    }

    /// Declaration from the externs: signature only, body not analyzed
    pub fn external(name: &str, params: &[&str], signature: FunctionSignature) -> Self {
        Self {
            name: Some(name.to_string()),
            params: params.iter().map(|p| p.to_string()).collect(),
            body: None,
            signature,
            ..Self::default()
        }
    }

    /// Declared without a body
    pub fn is_extern(&self) -> bool {
        self.body.is_none()
    }

    /// Name, or `<anonymous>`
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("<anonymous>")
    }
}

/// Statement of the program model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Stmt {
    /// `var name = init;`. `declared` is only consulted for extern declarations.
    Var {
        name: String,
        #[serde(default)]
        init: Option<Expr>,
        #[serde(default)]
        declared: Option<DeclaredType>,
    },
    /// Function declaration statement: binds the function's name in the enclosing scope
    Function(FunctionId),
    /// Expression evaluated for its effects
    Expr(Expr),
    /// `return` with an optional value
    Return(Option<Expr>),
    /// `if`; both branches are analyzed
    If {
        cond: Expr,
        then_branch: Vec<Stmt>,
        #[serde(default)]
        else_branch: Vec<Stmt>,
    },
    /// Loop; the body is analyzed once, flow-insensitively
    While {
        cond: Expr,
        body: Vec<Stmt>,
    },
    /// `{ ... }`
    Block(Vec<Stmt>),
}

impl Stmt {
    /// `var name = init;`
    pub fn var(name: &str, init: Expr) -> Self {
        Stmt::Var {
            name: name.to_string(),
            init: Some(init),
            declared: None,
        }
    }

    /// `var name;`
    pub fn declare(name: &str) -> Self {
        Stmt::Var {
            name: name.to_string(),
            init: None,
            declared: None,
        }
    }

    /// Extern variable with a declared type
    pub fn extern_var(name: &str, declared: DeclaredType) -> Self {
        Stmt::Var {
            name: name.to_string(),
            init: None,
            declared: Some(declared),
        }
    }

    /// Expression statement
    pub fn expr(expr: Expr) -> Self {
        Stmt::Expr(expr)
    }

    /// `return expr;`
    pub fn ret(expr: Expr) -> Self {
        Stmt::Return(Some(expr))
    }
}

/// `key: value` entry of an object literal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyInit {
    /// Property name
    pub key: String,
    /// Initializer
    pub value: Expr,
}

/// Expression forms that matter to type flow
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ExprKind {
    /// Variable reference
    Name(String),
    /// `this`
    This,
    /// Any primitive literal
    Literal,
    /// Function expression
    Function(FunctionId),
    /// `{ key: value, ... }`
    ObjectLit(Vec<PropertyInit>),
    /// `[a, b, ...]`
    ArrayLit(Vec<Expr>),
    /// `receiver.property`
    GetProp {
        receiver: Box<Expr>,
        property: String,
    },
    /// Computed member access; the property name is not statically known
    GetElem {
        receiver: Box<Expr>,
        index: Box<Expr>,
    },
    /// `callee(args)`
    Call {
        callee: Box<Expr>,
        args: Vec<Expr>,
    },
    /// `new callee(args)`
    New {
        callee: Box<Expr>,
        args: Vec<Expr>,
    },
    /// `target = value`
    Assign {
        target: Box<Expr>,
        value: Box<Expr>,
    },
    /// `a, b, ...`; evaluates to the last operand
    Comma(Vec<Expr>),
    /// `left && right`
    And(Box<Expr>, Box<Expr>),
    /// `left || right`
    Or(Box<Expr>, Box<Expr>),
    /// `cond ? then_expr : else_expr`
    Hook {
        cond: Box<Expr>,
        then_expr: Box<Expr>,
        else_expr: Box<Expr>,
    },
    /// Construct the analysis does not model (operators, `eval`, ...); operands are still visited
    Unknown(Vec<Expr>),
}

/// Expression plus its declared type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Expr {
    /// Expression form
    pub kind: ExprKind,
    /// Static type from the checker, if any
    #[serde(default)]
    pub declared: Option<DeclaredType>,
}

impl Expr {
    /// Expression with no declared type
    pub fn new(kind: ExprKind) -> Self {
        Self { kind, declared: None }
    }

    /// Attach the checker's declared type
    pub fn with_declared(mut self, declared: DeclaredType) -> Self {
        self.declared = Some(declared);
        self
    }

    /// Reference to `name`
    pub fn name(name: &str) -> Self {
        Self::new(ExprKind::Name(name.to_string()))
    }

    /// `this`
    pub fn this() -> Self {
        Self::new(ExprKind::This)
    }

    /// Any primitive literal
    pub fn literal() -> Self {
        Self::new(ExprKind::Literal).with_declared(DeclaredType::Primitive)
    }

    /// Function expression for `decl`
    pub fn function(decl: FunctionId) -> Self {
        Self::new(ExprKind::Function(decl))
    }

    /// Object literal typed as the record shape `shape`
    pub fn object_lit(shape: ShapeId, properties: Vec<(&str, Expr)>) -> Self {
        let properties = properties
            .into_iter()
            .map(|(key, value)| PropertyInit {
                key: key.to_string(),
                value,
            })
            .collect();
        Self::new(ExprKind::ObjectLit(properties)).with_declared(DeclaredType::Object(shape))
    }

    /// Array literal
    pub fn array_lit(elements: Vec<Expr>) -> Self {
        Self::new(ExprKind::ArrayLit(elements))
    }

    /// `receiver.property`
    pub fn get_prop(receiver: Expr, property: &str) -> Self {
        Self::new(ExprKind::GetProp {
            receiver: Box::new(receiver),
            property: property.to_string(),
        })
    }

    /// `receiver[index]`
    pub fn get_elem(receiver: Expr, index: Expr) -> Self {
        Self::new(ExprKind::GetElem {
            receiver: Box::new(receiver),
            index: Box::new(index),
        })
    }

    /// `callee(args)`
    pub fn call(callee: Expr, args: Vec<Expr>) -> Self {
        Self::new(ExprKind::Call {
            callee: Box::new(callee),
            args,
        })
    }

    /// `new callee(args)`
    pub fn construct(callee: Expr, args: Vec<Expr>) -> Self {
        Self::new(ExprKind::New {
            callee: Box::new(callee),
            args,
        })
    }

    /// `target = value`
    pub fn assign(target: Expr, value: Expr) -> Self {
        Self::new(ExprKind::Assign {
            target: Box::new(target),
            value: Box::new(value),
        })
    }

    /// `a, b, ...`
    pub fn comma(exprs: Vec<Expr>) -> Self {
        Self::new(ExprKind::Comma(exprs))
    }

    /// `left && right`
    pub fn and(left: Expr, right: Expr) -> Self {
        Self::new(ExprKind::And(Box::new(left), Box::new(right)))
    }

    /// `left || right`
    pub fn or(left: Expr, right: Expr) -> Self {
        Self::new(ExprKind::Or(Box::new(left), Box::new(right)))
    }

    /// `cond ? then_expr : else_expr`
    pub fn hook(cond: Expr, then_expr: Expr, else_expr: Expr) -> Self {
        Self::new(ExprKind::Hook {
            cond: Box::new(cond),
            then_expr: Box::new(then_expr),
            else_expr: Box::new(else_expr),
        })
    }

    /// Unmodeled construct over `operands`
    pub fn unknown(operands: Vec<Expr>) -> Self {
        Self::new(ExprKind::Unknown(operands))
    }
}

/// Declarations created by [`Program::add_class`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClassIds {
    /// Constructor function
    pub ctor: FunctionId,
    /// Shape of constructed objects
    pub instance: ShapeId,
    /// Shape of the constructor's prototype object
    pub prototype: ShapeId,
}

/// A whole compilation unit as produced by the parser and checker
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Program {
    /// Shape declarations, indexed by [`ShapeId`]
    #[serde(default)]
    pub shapes: Vec<ShapeDecl>,
    /// Function declarations, indexed by [`FunctionId`]
    #[serde(default)]
    pub functions: Vec<FunctionDecl>,
    /// Extern declarations, analyzed before the body
    #[serde(default)]
    pub externs: Vec<Stmt>,
    /// Top-level statements
    #[serde(default)]
    pub body: Vec<Stmt>,
    /// Instance shape of native array objects
    #[serde(default)]
    pub array_shape: Option<ShapeId>,
}

impl Program {
    /// Empty program
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a program serialized as JSON
    pub fn from_json(source: &str) -> serde_json::Result<Self> {
        serde_json::from_str(source)
    }

    /// Append a shape and return its id
    pub fn add_shape(&mut self, shape: ShapeDecl) -> ShapeId {
        let id = ShapeId(self.shapes.len() as u32);
        self.shapes.push(shape);
        id
    }

    /// Append a function declaration and return its id
    pub fn add_function(&mut self, decl: FunctionDecl) -> FunctionId {
        let id = FunctionId(self.functions.len() as u32);
        self.functions.push(decl);
        id
    }

    /// Mutable access for builders
    pub fn shape_mut(&mut self, id: ShapeId) -> Option<&mut ShapeDecl> {
        self.shapes.get_mut(id.index())
    }

    /// Mutable access for builders
    pub fn function_mut(&mut self, id: FunctionId) -> Option<&mut FunctionDecl> {
        self.functions.get_mut(id.index())
    }

    /// Declare a constructor together with its instance and prototype shapes.
    ///
    /// The prototype inherits from the superclass prototype, and the new instance
    /// shape is registered as a direct subtype of the superclass instance shape.
    pub fn add_class(
        &mut self,
        name: &str,
        superclass: Option<FunctionId>,
        params: &[&str],
        body: Vec<Stmt>,
        properties: &[&str],
    ) -> ClassIds {
        let super_decl = superclass.and_then(|id| self.functions.get(id.index()));
        let super_prototype = super_decl.and_then(|decl| decl.prototype_shape);
        let super_instance = super_decl.and_then(|decl| decl.instance_shape);

        let mut prototype = ShapeDecl::new(format!("{name}.prototype"), ShapeKind::Prototype);
        prototype.implicit_prototype = super_prototype;
        let prototype = self.add_shape(prototype);

        let instance = self.add_shape(
            ShapeDecl::instance(name)
                .with_properties(properties.iter().copied())
                .with_prototype(prototype),
        );
        if let Some(parent) = super_instance.and_then(|id| self.shape_mut(id)) {
            parent.subtypes.push(instance);
        }

        let mut decl = FunctionDecl::new(Some(name), params, body);
        decl.instance_shape = Some(instance);
        decl.prototype_shape = Some(prototype);
        decl.superclass = superclass;
        decl.signature.ret = DeclaredType::Object(instance);
        let ctor = self.add_function(decl);

        ClassIds {
            ctor,
            instance,
            prototype,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_class_links_prototype_chain() {
        let mut program = Program::new();
        let base = program.add_class("Base", None, &[], vec![], &["x"]);
        let derived = program.add_class("Derived", Some(base.ctor), &[], vec![], &["y"]);

        let derived_proto = &program.shapes[derived.prototype.index()];
        assert_eq!(derived_proto.implicit_prototype, Some(base.prototype));
        assert_eq!(program.shapes[base.instance.index()].subtypes, vec![derived.instance]);
        assert_eq!(program.functions[derived.ctor.index()].superclass, Some(base.ctor));
    }

    #[test]
    fn test_extern_function_has_no_body() {
        let decl = FunctionDecl::external("alert", &["msg"], FunctionSignature::default());
        assert!(decl.is_extern());
        assert_eq!(decl.display_name(), "alert");
    }

    #[test]
    fn test_program_json_roundtrip_shape() {
        let json = r#"{
            "shapes": [{ "name": "Foo", "kind": "Instance", "properties": ["a"] }],
            "functions": [{ "name": "Foo", "params": [], "body": [], "instance_shape": 0 }],
            "body": [
                { "Var": { "name": "x", "init": { "kind": { "New": { "callee": { "kind": { "Name": "Foo" } }, "args": [] } } } } }
            ]
        }"#;
        let program = Program::from_json(json).expect("valid program");
        assert_eq!(program.shapes[0].properties, vec!["a".to_string()]);
        assert_eq!(program.functions[0].instance_shape, Some(ShapeId(0)));
        assert!(matches!(program.body[0], Stmt::Var { .. }));
    }
}
