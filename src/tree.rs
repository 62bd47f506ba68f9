//! # Pass driver
//!
//! `Tree` owns the whole definition arena and drives it through the six
//! ordered passes: `Parse` (done by merging in an already-parsed module),
//! `CheckReturnStatements`, `MakeGenericTypesConcrete`,
//! `ConvertClosureTypes`, `GenerateCloneMethods`, and
//! `TypeCheckAndTransform`. Each pass is a method run in that fixed order
//! by [`Tree::lower`]; nothing here reorders or skips a pass.

use std::collections::HashMap;
use std::sync::Arc;

use log::{debug, trace};

use crate::ast::definitions::{ClassDefinition, ClassProperties, DataMemberDefinition, Definition, ForwardDeclarationDefinition, GenericTypeParameterDefinition, MethodDefinition};
use crate::ast::expressions::{Expression, Literal};
use crate::ast::statements::{Block, Statement, VariableDeclarationKind};
use crate::common::multiphase::Identifier;
use crate::diagnostics::{CompileError, CompileErrorKind, Result as CompileResult};
use crate::lexing::lexer::Lexer;
use crate::lexing::Tokens;
use crate::lowering::{clone_gen, closure_gen, defer_gen, enum_gen, match_gen};
use crate::model::bindings::{Binding, NameBindings};
use crate::model::ids::{DefinitionId, LocalId};
use crate::model::types::{BuiltInKind, Type};
use crate::parsing::{self, ParsedModule};
use crate::source::in_memory::Source;

impl From<parsing::Error> for CompileError {
    fn from(error: parsing::Error) -> Self {
        match error {
            parsing::Error::Parser(err) => CompileError::new(err.location, CompileErrorKind::Internal("parsing", err.description.to_string())),
            parsing::Error::Lexer(_) => CompileError::internal(crate::diagnostics::SourceLocation::generated(), "lexing", "malformed source"),
        }
    }
}

pub struct Tree {
    pub definitions: Vec<Definition>,
    pub global_bindings: NameBindings,
    pub object_class: DefinitionId,
    pub global_functions_class: DefinitionId,
    pub array_class: DefinitionId,
    pub cloneable_interface: DefinitionId,
    pub defer_class: DefinitionId,
    pub no_arg_closure_interface: DefinitionId,
    next_local: usize,
    next_closure_id: usize,
    open_classes: Vec<DefinitionId>,
    pub(crate) closure_interfaces: HashMap<String, DefinitionId>,
    generic_instantiations: HashMap<String, DefinitionId>,
    /// Independent top-level definitions (closure interfaces, generated
    /// closure classes, generic instantiations, forward declarations) a
    /// lowering generator created after `top_level` was built. Not
    /// reachable by walking `top_level` alone; `top_level_with_generated`
    /// is what a caller must actually hand to `LoweredModule::partition`.
    generated_roots: Vec<DefinitionId>,
    /// Declared type of a true local (one the source itself introduced, or
    /// a pattern-bound/match-subject local a lowering pass synthesized).
    /// `LocalVariableReference` carries no type of its own, so this is the
    /// only way `expression_type` can answer for one.
    local_types: HashMap<LocalId, Type>,
}

impl Tree {
    /// Builds the bootstrap namespace spec §4.6 "Startup" describes:
    /// the built-in scalar kinds need no class (they live entirely in
    /// `BuiltInKind`), but `object`, `_Global_Functions_`, `Array<T>`, the
    /// no-arg closure interface, `Cloneable`, and `Defer` are real classes
    /// later passes and lowering generators look up by id.
    pub fn new() -> Self {
        let mut tree = Self {
            definitions: Vec::new(),
            global_bindings: NameBindings::new(),
            object_class: DefinitionId::default_placeholder(),
            global_functions_class: DefinitionId::default_placeholder(),
            array_class: DefinitionId::default_placeholder(),
            cloneable_interface: DefinitionId::default_placeholder(),
            defer_class: DefinitionId::default_placeholder(),
            no_arg_closure_interface: DefinitionId::default_placeholder(),
            next_local: 0,
            next_closure_id: 0,
            open_classes: Vec::new(),
            closure_interfaces: HashMap::new(),
            generic_instantiations: HashMap::new(),
            generated_roots: Vec::new(),
            local_types: HashMap::new(),
        };
        tree.bootstrap();
        tree
    }

    fn bootstrap(&mut self) {
        self.object_class = self.start_class(Identifier::from("object"), ClassProperties::default());
        self.end_class();

        self.global_functions_class = self.start_class(Identifier::from("_Global_Functions_"), ClassProperties::default());
        self.end_class();

        self.cloneable_interface = self.start_class(
            Identifier::from("Cloneable"),
            ClassProperties {
                is_interface: true,
                ..ClassProperties::default()
            },
        );
        self.end_class();

        self.no_arg_closure_interface = self.start_class(
            Identifier::from("fun_void_"),
            ClassProperties {
                is_interface: true,
                is_closure: true,
                ..ClassProperties::default()
            },
        );
        let call = self.declare_abstract_method(self.no_arg_closure_interface, "call", Type::built_in(BuiltInKind::Void), &[]);
        self.class_mut(self.no_arg_closure_interface).add_method(call);
        self.end_class();

        self.defer_class = self.start_class(Identifier::from("Defer"), ClassProperties::default());
        let closure_param = self.alloc(Definition::DataMember(DataMemberDefinition::new(
            Identifier::from("closure"),
            crate::diagnostics::SourceLocation::generated(),
            self.defer_class,
            Type::named(Identifier::from("fun_void_")),
        )));
        let add_closure = self.declare_abstract_method(self.defer_class, "addClosure", Type::built_in(BuiltInKind::Void), &[closure_param]);
        self.class_mut(self.defer_class).add_method(add_closure);
        self.end_class();

        self.array_class = self.start_class(
            Identifier::from("Array"),
            ClassProperties {
                is_generated: true,
                ..ClassProperties::default()
            },
        );
        let element_param = self.alloc(Definition::GenericTypeParameter(GenericTypeParameterDefinition::new(
            Identifier::from("T"),
            crate::diagnostics::SourceLocation::generated(),
            Some(self.array_class),
        )));
        self.class_mut(self.array_class).generic_type_parameters.push(element_param);
        for (name, return_type) in [
            ("length", Type::built_in(BuiltInKind::Int)),
            ("size", Type::built_in(BuiltInKind::Int)),
            ("capacity", Type::built_in(BuiltInKind::Int)),
        ] {
            let method = self.declare_abstract_method(self.array_class, name, return_type, &[]);
            self.class_mut(self.array_class).add_method(method);
        }
        self.end_class();
    }

    pub(crate) fn declare_abstract_method(&mut self, class_id: DefinitionId, name: &str, return_type: Type, arguments: &[DefinitionId]) -> DefinitionId {
        let mut method = MethodDefinition::new(Identifier::from(name), crate::diagnostics::SourceLocation::generated(), class_id, return_type);
        method.arguments = arguments.to_vec();
        self.alloc(Definition::Method(method))
    }

    fn alloc(&mut self, definition: Definition) -> DefinitionId {
        let id = DefinitionId::at(self.definitions.len());
        self.definitions.push(definition);
        id
    }

    pub fn alloc_local(&mut self) -> LocalId {
        let id = LocalId::at(self.next_local);
        self.next_local += 1;
        id
    }

    /// A fresh, crate-unique suffix for a generated closure capture class's
    /// name (`$Closure$N`).
    pub fn next_closure_id(&mut self) -> usize {
        let id = self.next_closure_id;
        self.next_closure_id += 1;
        id
    }

    /// Records an independent top-level definition a lowering generator
    /// just created, so `top_level_with_generated` can hand it to the
    /// back-end contract alongside what parsing produced.
    pub fn record_generated_root(&mut self, id: DefinitionId) {
        self.generated_roots.push(id);
    }

    /// `top_level` plus every generated root recorded since, in the order
    /// generated. Callers partition against this, never against
    /// `top_level` alone, once lowering has run.
    pub fn top_level_with_generated(&self, top_level: &[DefinitionId]) -> Vec<DefinitionId> {
        top_level.iter().copied().chain(self.generated_roots.iter().copied()).collect()
    }

    /// Remembers a true local's declared type, so `expression_type` can
    /// later answer for a bare `LocalVariableReference` to it.
    pub(crate) fn set_local_type(&mut self, local: LocalId, declared_type: Type) {
        self.local_types.insert(local, declared_type);
    }

    fn local_type(&self, local: LocalId) -> Option<Type> {
        self.local_types.get(&local).cloned()
    }

    /// The first data member directly declared on `class_id` (not its
    /// bases) with the given name, e.g. a generated `$tag` or
    /// `$<Variant>Tag` field.
    pub(crate) fn find_data_member(&self, class_id: DefinitionId, name: &str) -> Option<DefinitionId> {
        let name = Identifier::from(name);
        self.class(class_id).data_members.iter().copied().find(|&id| self.data_member(id).name == name)
    }

    /// Declares a class nested directly inside `parent`, independent of
    /// the `start_class`/`end_class` open-class stack: used by generators
    /// that synthesize a member class (an enum variant's payload class)
    /// outside of the normal parse-time nesting flow.
    pub fn declare_nested_class(&mut self, parent: DefinitionId, name: Identifier, properties: ClassProperties) -> DefinitionId {
        let mut class = ClassDefinition::new(name, crate::diagnostics::SourceLocation::generated(), Some(parent));
        class.properties = properties;
        let class_id = self.alloc(Definition::Class(class));
        self.class_mut(parent).members.push(class_id);
        class_id
    }

    /// An empty no-argument constructor for a generated class: it only
    /// ever needs to exist so a `new` allocation of that class can call
    /// it, since the class's state is filled in by field assignment after
    /// construction rather than through constructor arguments.
    pub fn declare_no_arg_constructor(&mut self, class_id: DefinitionId, class_name: &Identifier) -> DefinitionId {
        let mut ctor = MethodDefinition::new(MethodDefinition::constructor_name(class_name), crate::diagnostics::SourceLocation::generated(), class_id, Type::built_in(BuiltInKind::Void));
        ctor.is_constructor = true;
        ctor.is_generated = true;
        ctor.body = Some(Block::new(NameBindings::new()));
        ctor.has_been_type_checked_and_transformed = true;
        let ctor_id = self.alloc_method(ctor);
        self.class_mut(class_id).add_method(ctor_id);
        ctor_id
    }

    /// The data member a class's generated code funnels deferred closures
    /// through, creating it on first use.
    pub fn ensure_defer_member(&mut self, class_id: DefinitionId) -> DefinitionId {
        let name = Identifier::from("$defer");
        if let Some(&existing) = self.class(class_id).data_members.iter().find(|&&id| self.data_member(id).name == name) {
            return existing;
        }
        let defer_type = Type::named(Identifier::from("Defer"));
        let member_id = self.declare_data_member(class_id, "$defer", defer_type);
        self.class_mut(class_id).add_data_member(member_id);
        member_id
    }

    pub fn class(&self, id: DefinitionId) -> &ClassDefinition {
        self.definitions[id.index()].as_class().expect("id does not name a class")
    }

    pub fn class_mut(&mut self, id: DefinitionId) -> &mut ClassDefinition {
        self.definitions[id.index()].as_class_mut().expect("id does not name a class")
    }

    pub fn method(&self, id: DefinitionId) -> &MethodDefinition {
        self.definitions[id.index()].as_method().expect("id does not name a method")
    }

    pub fn method_mut(&mut self, id: DefinitionId) -> &mut MethodDefinition {
        self.definitions[id.index()].as_method_mut().expect("id does not name a method")
    }

    pub fn data_member(&self, id: DefinitionId) -> &DataMemberDefinition {
        self.definitions[id.index()].as_data_member().expect("id does not name a data member")
    }

    pub(crate) fn data_member_mut(&mut self, id: DefinitionId) -> &mut DataMemberDefinition {
        match &mut self.definitions[id.index()] {
            Definition::DataMember(member) => member,
            _ => panic!("id does not name a data member"),
        }
    }

    /// Allocates a data member not attached to any class's member lists
    /// yet; the caller attaches it with `add_data_member`/
    /// `add_primary_ctor_arg_data_member`. Used by the `lowering`
    /// generators to synthesize members a pass needs (a clone flag, an
    /// enum tag, a closure's captured-variable storage).
    pub fn declare_data_member(&mut self, class_id: DefinitionId, name: &str, declared_type: Type) -> DefinitionId {
        self.alloc(Definition::DataMember(DataMemberDefinition::new(
            Identifier::from(name),
            crate::diagnostics::SourceLocation::generated(),
            class_id,
            declared_type,
        )))
    }

    /// Allocates a concrete (non-abstract) method with the given body,
    /// attached to `class_id`'s member lists.
    pub fn declare_method(&mut self, class_id: DefinitionId, name: &str, return_type: Type, arguments: Vec<DefinitionId>, body: Block) -> DefinitionId {
        let mut method = MethodDefinition::new(Identifier::from(name), crate::diagnostics::SourceLocation::generated(), class_id, return_type);
        method.arguments = arguments;
        method.body = Some(body);
        method.is_generated = true;
        let id = self.alloc(Definition::Method(method));
        self.class_mut(class_id).add_method(id);
        id
    }

    /// Allocates an already fully-built method without attaching it to any
    /// class's member lists; the caller attaches it with `add_method`.
    /// Used by the `lowering` generators, which need full control over a
    /// method's flags (constructor, return type) before it's visible.
    pub(crate) fn alloc_method(&mut self, method: MethodDefinition) -> DefinitionId {
        self.alloc(Definition::Method(method))
    }

    pub fn start_class(&mut self, name: Identifier, properties: ClassProperties) -> DefinitionId {
        let enclosing = self.open_classes.last().copied();
        let mut class = ClassDefinition::new(name.clone(), crate::diagnostics::SourceLocation::generated(), enclosing);
        class.properties = properties;
        let class_id = self.alloc(Definition::Class(class));
        if let Some(parent) = enclosing {
            self.class_mut(parent).members.push(class_id);
        }
        self.global_bindings.insert_class(name, class_id);
        self.open_classes.push(class_id);
        class_id
    }

    pub fn end_class(&mut self) {
        self.open_classes.pop();
    }

    /// Parses `source` and merges its definitions into this tree's arena,
    /// shifting every `DefinitionId` the module carries so it lands past
    /// what the bootstrap and any earlier module already allocated.
    /// Linking several modules together beyond what this needs is out of
    /// scope; callers typically call this once per `Tree`.
    pub fn merge_source(&mut self, source: &str, file: impl Into<Arc<str>>) -> CompileResult<Vec<DefinitionId>> {
        let file = file.into();
        let chars = source.chars().collect::<Vec<char>>();
        let lexer = Lexer::from(Source::from(chars));
        let tokens = Tokens::from(lexer).map_err(|_| CompileError::internal(crate::diagnostics::SourceLocation::generated(), "lexing", "failed to start the lexer thread"))?;
        let module = parsing::parse(tokens, file)?;
        Ok(self.merge_module(module))
    }

    fn merge_module(&mut self, module: ParsedModule) -> Vec<DefinitionId> {
        let offset = self.definitions.len();
        self.next_local += module.local_count;

        for definition in module.definitions {
            self.definitions.push(Self::shift_definition(definition, offset));
        }

        let top_level = module.top_level.into_iter().map(|id| DefinitionId::at(id.index() + offset)).collect::<Vec<_>>();
        for &id in &top_level {
            let name = self.definitions[id.index()].name().clone();
            self.global_bindings.insert_class(name, id);
        }
        top_level
    }

    fn shift(id: DefinitionId, offset: usize) -> DefinitionId {
        DefinitionId::at(id.index() + offset)
    }

    fn shift_definition(definition: Definition, offset: usize) -> Definition {
        match definition {
            Definition::Class(mut class) => {
                class.enclosing = class.enclosing.map(|id| Self::shift(id, offset));
                class.base_class = class.base_class.map(|id| Self::shift(id, offset));
                class.parent_classes = class.parent_classes.into_iter().map(|id| Self::shift(id, offset)).collect();
                class.generic_type_parameters = class.generic_type_parameters.into_iter().map(|id| Self::shift(id, offset)).collect();
                class.members = class.members.into_iter().map(|id| Self::shift(id, offset)).collect();
                class.methods = class.methods.into_iter().map(|id| Self::shift(id, offset)).collect();
                class.data_members = class.data_members.into_iter().map(|id| Self::shift(id, offset)).collect();
                class.primary_ctor_arg_data_members = class.primary_ctor_arg_data_members.into_iter().map(|id| Self::shift(id, offset)).collect();
                Definition::Class(class)
            }
            Definition::Method(mut method) => {
                method.enclosing_class = Self::shift(method.enclosing_class, offset);
                method.arguments = method.arguments.into_iter().map(|id| Self::shift(id, offset)).collect();
                Definition::Method(method)
            }
            Definition::DataMember(mut member) => {
                member.enclosing_class = Self::shift(member.enclosing_class, offset);
                Definition::DataMember(member)
            }
            Definition::GenericTypeParameter(mut parameter) => {
                parameter.enclosing = parameter.enclosing.map(|id| Self::shift(id, offset));
                Definition::GenericTypeParameter(parameter)
            }
            Definition::ForwardDeclaration(mut forward) => {
                forward.target = forward.target.map(|id| Self::shift(id, offset));
                Definition::ForwardDeclaration(forward)
            }
        }
    }

    /// Runs every pass, in the one fixed order spec §4.6 requires.
    pub fn lower(&mut self, top_level: &[DefinitionId]) -> CompileResult<()> {
        debug!("resolving {} top-level parent lists", top_level.len());
        self.resolve_parent_names(top_level)?;

        debug!("lowering enumeration variants to tagged-union constructors");
        for class_id in self.class_ids(top_level) {
            enum_gen::generate(self, class_id);
        }

        debug!("pass: CheckReturnStatements");
        self.check_return_statements(top_level)?;

        debug!("pass: MakeGenericTypesConcrete");
        self.make_generic_types_concrete(top_level)?;

        debug!("pass: ConvertClosureTypes");
        self.convert_closure_types(top_level)?;

        debug!("pass: GenerateCloneMethods");
        self.generate_clone_methods(top_level)?;

        debug!("lowering defer statements to addClosure calls");
        self.lower_defer_statements(top_level);

        debug!("pass: TypeCheckAndTransform");
        self.type_check_and_transform(top_level)?;

        Ok(())
    }

    fn class_ids(&self, top_level: &[DefinitionId]) -> Vec<DefinitionId> {
        top_level
            .iter()
            .copied()
            .filter(|id| self.definitions[id.index()].as_class().is_some())
            .collect()
    }

    /// Turns `ClassDefinition::unresolved_parents` into `base_class` /
    /// `parent_classes`, per spec §8 invariant 1 (at most one concrete
    /// base).
    fn resolve_parent_names(&mut self, top_level: &[DefinitionId]) -> CompileResult<()> {
        for class_id in self.class_ids(top_level) {
            let parent_names = self.class(class_id).unresolved_parents.clone();
            for parent_name in parent_names {
                let parent_id = self.global_bindings.lookup_type(&parent_name).ok_or_else(|| {
                    CompileError::new(self.class(class_id).location.clone(), CompileErrorKind::UnknownType(parent_name.clone()))
                })?;
                let parent_is_interface = self.class(parent_id).properties.is_interface;
                let class = self.class_mut(class_id);
                class.parent_classes.push(parent_id);
                if !parent_is_interface {
                    if class.base_class.is_some() {
                        return Err(CompileError::new(class.location.clone(), CompileErrorKind::MultipleConcreteBases(class.name.clone())));
                    }
                    class.base_class = Some(parent_id);
                }
            }
        }
        Ok(())
    }

    fn check_return_statements(&self, top_level: &[DefinitionId]) -> CompileResult<()> {
        for class_id in self.class_ids(top_level) {
            for &method_id in &self.class(class_id).methods.clone() {
                let method = self.method(method_id);
                if method.is_generated || method.is_constructor || method.return_type.is_void() {
                    continue;
                }
                if let Some(body) = &method.body {
                    if !Self::block_always_returns(body) {
                        return Err(CompileError::new(method.location.clone(), CompileErrorKind::MissingReturn(method.name.clone())));
                    }
                }
            }
        }
        Ok(())
    }

    fn block_always_returns(block: &Block) -> bool {
        block.statements.last().is_some_and(Self::statement_always_returns)
    }

    fn statement_always_returns(statement: &Statement) -> bool {
        match statement {
            Statement::Return(_) => true,
            Statement::Block(block) => Self::block_always_returns(block),
            Statement::If(if_statement) => match &if_statement.else_branch {
                Some(else_branch) => Self::statement_always_returns(&if_statement.then_branch) && Self::statement_always_returns(else_branch),
                None => false,
            },
            Statement::While(while_statement) => while_statement.never_falls_through,
            _ => false,
        }
    }

    /// Resolves every non-generic class's member types, instantiating a
    /// concrete copy of any generic class a type argument list names along
    /// the way. Recursive and inner-class-parameterized placement (spec
    /// §4.6) is not replicated; every instantiation is simply inserted
    /// immediately, which is correct for the common non-recursive case.
    fn make_generic_types_concrete(&mut self, top_level: &[DefinitionId]) -> CompileResult<()> {
        for class_id in self.class_ids(top_level) {
            if self.class(class_id).is_generic() {
                continue;
            }
            self.resolve_class_member_types(class_id)?;
        }
        Ok(())
    }

    fn resolve_class_member_types(&mut self, class_id: DefinitionId) -> CompileResult<()> {
        for member_id in self.class(class_id).data_members.clone() {
            let resolved = self.resolve_type(self.data_member(member_id).declared_type.clone())?;
            self.data_member_mut(member_id).declared_type = resolved;
        }
        for method_id in self.class(class_id).methods.clone() {
            let resolved_return = self.resolve_type(self.method(method_id).return_type.clone())?;
            self.method_mut(method_id).return_type = resolved_return;
            for argument_id in self.method(method_id).arguments.clone() {
                let resolved = self.resolve_type(self.data_member(argument_id).declared_type.clone())?;
                self.data_member_mut(argument_id).declared_type = resolved;
            }
        }
        Ok(())
    }

    fn resolve_type(&mut self, declared: Type) -> CompileResult<Type> {
        if declared.is_built_in() || declared.is_placeholder() || declared.definition().is_some() {
            return Ok(declared);
        }

        let target_id = self
            .global_bindings
            .lookup_type(declared.name())
            .ok_or_else(|| CompileError::new(crate::diagnostics::SourceLocation::generated(), CompileErrorKind::UnknownType(declared.name().clone())))?;

        let resolved_id = if self.class(target_id).is_generic() {
            if declared.generic_type_arguments().is_empty() {
                return Err(CompileError::new(
                    crate::diagnostics::SourceLocation::generated(),
                    CompileErrorKind::CannotInferGenericArguments(declared.name().clone()),
                ));
            }
            self.instantiate_generic(target_id, declared.generic_type_arguments().to_vec())?
        } else {
            target_id
        };

        let is_enumeration = self.class(resolved_id).properties.is_enumeration;
        let mut resolved = declared;
        resolved.set_definition(resolved_id, is_enumeration, false);
        Ok(resolved)
    }

    /// Clones a generic class's shape with its type parameters substituted
    /// for `type_arguments`, caching by the mangled constructed name so
    /// `List<int>` is only ever generated once.
    fn instantiate_generic(&mut self, generic_id: DefinitionId, type_arguments: Vec<Type>) -> CompileResult<DefinitionId> {
        let args_key = type_arguments.iter().map(Type::full_constructed_name).collect::<Vec<_>>().join(",");
        let cache_key = format!("{}<{}>", self.class(generic_id).name, args_key);
        if let Some(&existing) = self.generic_instantiations.get(&cache_key) {
            return Ok(existing);
        }
        trace!("instantiating {}", cache_key);

        let substitutions: HashMap<Identifier, Type> = self
            .class(generic_id)
            .generic_type_parameters
            .iter()
            .map(|&id| match &self.definitions[id.index()] {
                Definition::GenericTypeParameter(parameter) => parameter.name.clone(),
                _ => unreachable!("generic_type_parameters only ever holds GenericTypeParameter ids"),
            })
            .zip(type_arguments.iter().cloned())
            .collect();

        let mangled_name = Identifier::from(crate::backend_contract::mangle(&cache_key));
        let original = self.class(generic_id).clone();
        let new_class_id = self.alloc(Definition::Class(ClassDefinition {
            name: mangled_name.clone(),
            generic_type_parameters: Vec::new(),
            members: Vec::new(),
            methods: Vec::new(),
            data_members: Vec::new(),
            primary_ctor_arg_data_members: Vec::new(),
            ..original.clone()
        }));
        self.generic_instantiations.insert(cache_key, new_class_id);
        self.global_bindings.insert_class(mangled_name.clone(), new_class_id);

        for &member_id in &original.data_members {
            let mut member = self.data_member(member_id).clone();
            member.enclosing_class = new_class_id;
            member.declared_type = Self::substitute(member.declared_type, &substitutions);
            let cloned_id = self.alloc(Definition::DataMember(member));
            self.class_mut(new_class_id).add_data_member(cloned_id);
            if original.primary_ctor_arg_data_members.contains(&member_id) {
                self.class_mut(new_class_id).primary_ctor_arg_data_members.push(cloned_id);
            }
        }

        for &method_id in &original.methods {
            let mut method = self.method(method_id).clone();
            method.enclosing_class = new_class_id;
            method.return_type = Self::substitute(method.return_type, &substitutions);
            if method.is_constructor {
                method.name = MethodDefinition::constructor_name(&mangled_name);
            }
            let mut arguments = Vec::new();
            for argument_id in &method.arguments {
                let mut argument = self.data_member(*argument_id).clone();
                argument.enclosing_class = new_class_id;
                argument.declared_type = Self::substitute(argument.declared_type, &substitutions);
                arguments.push(self.alloc(Definition::DataMember(argument)));
            }
            method.arguments = arguments;
            let cloned_id = self.alloc(Definition::Method(method));
            self.class_mut(new_class_id).add_method(cloned_id);
        }

        // Resolve the cloned shape's member types the same way an ordinary
        // top-level class's are resolved. A self-referential generic (a
        // node class holding a member of its own generic type) resolves
        // cleanly here: the cache entry inserted above means the recursive
        // `instantiate_generic` call this triggers is a cache hit, not
        // infinite recursion.
        self.resolve_class_member_types(new_class_id)?;

        let is_recursive = self.class(new_class_id).data_members.iter().any(|&id| self.data_member(id).declared_type.definition() == Some(new_class_id))
            || self.class(new_class_id).methods.iter().any(|&id| {
                let method = self.method(id);
                method.return_type.definition() == Some(new_class_id) || method.arguments.iter().any(|&argument_id| self.data_member(argument_id).declared_type.definition() == Some(new_class_id))
            });
        if is_recursive {
            self.class_mut(new_class_id).is_recursive = true;
            let forward_id = self.alloc(Definition::ForwardDeclaration(ForwardDeclarationDefinition {
                name: mangled_name.clone(),
                location: crate::diagnostics::SourceLocation::generated(),
                target: Some(new_class_id),
            }));
            self.record_generated_root(forward_id);
        }
        self.record_generated_root(new_class_id);

        Ok(new_class_id)
    }

    /// Substitutes a generic type parameter's name for its concrete
    /// argument, recursing into `generic_type_arguments` so a nested
    /// occurrence (`List<T>`'s own `T` inside `Pair<T,U>`) is replaced too,
    /// not just a bare top-level type parameter reference.
    fn substitute(ty: Type, substitutions: &HashMap<Identifier, Type>) -> Type {
        if let Some(concrete) = substitutions.get(ty.name()) {
            let mut replaced = concrete.clone();
            replaced.set_array(ty.is_array() || concrete.is_array());
            return replaced;
        }
        if ty.has_generic_type_arguments() {
            let substituted_arguments = ty.generic_type_arguments().iter().cloned().map(|argument| Self::substitute(argument, substitutions)).collect();
            return ty.with_generic_type_arguments(substituted_arguments);
        }
        ty
    }

    /// Replaces every `fun R(A,B,...)` type in a signature or data member
    /// with a reference to the concrete closure interface generated for
    /// that exact signature.
    fn convert_closure_types(&mut self, top_level: &[DefinitionId]) -> CompileResult<()> {
        for class_id in self.class_ids(top_level) {
            if self.class(class_id).is_generic() {
                continue;
            }
            for member_id in self.class(class_id).data_members.clone() {
                let converted = self.convert_function_type(self.data_member(member_id).declared_type.clone())?;
                self.data_member_mut(member_id).declared_type = converted;
            }
            for method_id in self.class(class_id).methods.clone() {
                let converted = self.convert_function_type(self.method(method_id).return_type.clone())?;
                self.method_mut(method_id).return_type = converted;
                for argument_id in self.method(method_id).arguments.clone() {
                    let converted = self.convert_function_type(self.data_member(argument_id).declared_type.clone())?;
                    self.data_member_mut(argument_id).declared_type = converted;
                }
            }
        }
        Ok(())
    }

    fn convert_function_type(&mut self, ty: Type) -> CompileResult<Type> {
        let signature = match ty.function_signature() {
            Some(signature) => signature.clone(),
            None => return Ok(ty),
        };
        let interface_id = closure_gen::ensure_interface(self, &signature);
        let mut converted = Type::named(self.class(interface_id).name.clone());
        converted.set_array(ty.is_array());
        converted.set_definition(interface_id, false, false);
        Ok(converted)
    }

    fn generate_clone_methods(&mut self, top_level: &[DefinitionId]) -> CompileResult<()> {
        for class_id in self.class_ids(top_level) {
            let properties = self.class(class_id).properties;
            if !properties.is_message {
                continue;
            }
            if properties.is_enumeration {
                clone_gen::generate_deep_copy(self, class_id);
            } else if !properties.is_interface {
                clone_gen::generate_clone_and_copy_constructor(self, class_id);
            }
        }
        Ok(())
    }

    /// Rewrites every `defer { ... }` statement in every method body into a
    /// call that hands a generated closure to the enclosing class's
    /// `Defer` queue.
    fn lower_defer_statements(&mut self, top_level: &[DefinitionId]) {
        for class_id in self.class_ids(top_level) {
            for method_id in self.class(class_id).methods.clone() {
                let mut body = self.method_mut(method_id).body.take();
                if let Some(block) = &mut body {
                    self.rewrite_defer_in_block(class_id, block);
                }
                self.method_mut(method_id).body = body;
            }
        }
    }

    fn rewrite_defer_in_block(&mut self, class_id: DefinitionId, block: &mut Block) {
        for statement in &mut block.statements {
            self.rewrite_defer_in_statement(class_id, statement);
        }
    }

    fn rewrite_defer_in_statement(&mut self, class_id: DefinitionId, statement: &mut Statement) {
        match statement {
            Statement::Block(inner) => self.rewrite_defer_in_block(class_id, inner),
            Statement::If(if_statement) => {
                self.rewrite_defer_in_statement(class_id, &mut if_statement.then_branch);
                if let Some(else_branch) = &mut if_statement.else_branch {
                    self.rewrite_defer_in_statement(class_id, else_branch);
                }
            }
            Statement::While(while_statement) => self.rewrite_defer_in_statement(class_id, &mut while_statement.body),
            Statement::For(for_statement) => self.rewrite_defer_in_statement(class_id, &mut for_statement.body),
            Statement::Defer(_) => {
                if let Statement::Defer(defer) = std::mem::replace(statement, Statement::Break) {
                    *statement = defer_gen::lower(self, class_id, *defer.body);
                }
            }
            _ => {}
        }
    }

    fn type_check_and_transform(&mut self, top_level: &[DefinitionId]) -> CompileResult<()> {
        for class_id in self.class_ids(top_level) {
            let class_scope = self.build_class_scope(class_id);
            for method_id in self.class(class_id).methods.clone() {
                if self.method(method_id).has_been_type_checked_and_transformed {
                    continue;
                }
                let location = self.method(method_id).location.clone();
                let mut parameter_scope = NameBindings::nested_in(class_scope.clone());
                for &argument_id in &self.method(method_id).arguments.clone() {
                    let argument = self.data_member(argument_id);
                    parameter_scope.insert_parameter(argument.name.clone(), argument_id);
                }
                let mut body = self.method_mut(method_id).body.take();
                if let Some(block) = &mut body {
                    self.resolve_block(block, &parameter_scope, &location)?;
                }
                self.method_mut(method_id).body = body;
                self.method_mut(method_id).has_been_type_checked_and_transformed = true;
            }
        }
        Ok(())
    }

    /// Builds the scope a method body of `class_id` resolves bare names
    /// against: its own data members and methods, plus (recursively) its
    /// base class's. An inherited name a subclass also declares may
    /// resolve to either declaration; this is a known simplification, see
    /// `DESIGN.md`.
    pub(crate) fn build_class_scope(&self, class_id: DefinitionId) -> NameBindings {
        let mut scope = NameBindings::new();
        if let Some(base_id) = self.class(class_id).base_class {
            scope.copy_from(&self.build_class_scope(base_id));
        }
        let class = self.class(class_id);
        for &member_id in &class.data_members {
            scope.insert_data_member(self.data_member(member_id).name.clone(), member_id);
        }
        for &method_id in &class.methods {
            scope.overload_method(self.method(method_id).name.clone(), method_id);
        }
        scope
    }

    /// `true` iff `sub` is `base` or inherits from it, directly or
    /// transitively, through either `base_class` or an interface in
    /// `parent_classes`. Feeds the `is_subclass_of` callback every
    /// `Type` comparison/conversion function takes, since `Type` itself
    /// has no hierarchy traversal of its own.
    pub(crate) fn is_subclass_of(&self, sub: DefinitionId, base: DefinitionId) -> bool {
        if sub == base {
            return true;
        }
        let class = match self.definitions[sub.index()].as_class() {
            Some(class) => class,
            None => return false,
        };
        if class.base_class.is_some_and(|base_class| self.is_subclass_of(base_class, base)) {
            return true;
        }
        class.parent_classes.iter().any(|&parent| self.is_subclass_of(parent, base))
    }

    /// A best-effort static type for an already-resolved expression: exact
    /// for literals, data members, casts, and anything an earlier pass
    /// already annotated (`result_type`/`element_type`/`inner_type`);
    /// `None` for forms (a bare `Name`, `This`, an un-annotated
    /// `MethodCall`) a caller must resolve through some other route first.
    pub(crate) fn expression_type(&self, expression: &Expression) -> Option<Type> {
        match expression {
            Expression::Literal(Literal::Void) => Some(Type::built_in(BuiltInKind::Void)),
            Expression::Literal(Literal::Null) => Some(Type::null()),
            Expression::Literal(Literal::Bool(_)) => Some(Type::built_in(BuiltInKind::Bool)),
            Expression::Literal(Literal::Byte(_)) => Some(Type::built_in(BuiltInKind::Byte)),
            Expression::Literal(Literal::Char(_)) => Some(Type::built_in(BuiltInKind::Char)),
            Expression::Literal(Literal::Int(_)) => Some(Type::built_in(BuiltInKind::Int)),
            Expression::Literal(Literal::Float(_)) => Some(Type::built_in(BuiltInKind::Float)),
            Expression::Literal(Literal::String(_)) => Some(Type::built_in(BuiltInKind::String)),
            Expression::LocalVariableReference(local) => self.local_type(*local),
            Expression::DataMemberReference { member, .. } => Some(self.data_member(*member).declared_type.clone()),
            Expression::TypeCast(cast) => Some(cast.target.clone()),
            Expression::MethodCall(call) => call.result_type.clone(),
            Expression::Binary { result_type, .. } => result_type.clone(),
            Expression::Unary { result_type, .. } => result_type.clone(),
            Expression::Subscript(subscript) => subscript.element_type.clone(),
            Expression::Temporary(temporary) => Some(temporary.inner_type.clone()),
            Expression::New(allocation) => allocation.result_type.clone(),
            _ => None,
        }
    }

    pub(crate) fn resolve_block(&mut self, block: &mut Block, class_scope: &NameBindings, location: &crate::diagnostics::SourceLocation) -> CompileResult<()> {
        let scope = block.bindings.clone();
        for statement in &mut block.statements {
            self.resolve_statement(statement, class_scope, &scope, location)?;
        }
        Ok(())
    }

    pub(crate) fn resolve_statement(
        &mut self,
        statement: &mut Statement,
        class_scope: &NameBindings,
        scope: &NameBindings,
        location: &crate::diagnostics::SourceLocation,
    ) -> CompileResult<()> {
        match statement {
            Statement::Block(block) => self.resolve_block(block, class_scope, location),
            Statement::VarDeclaration(declaration) => match &mut declaration.initializer {
                Some(initializer) => self.resolve_expression(initializer, class_scope, scope, location),
                None => Ok(()),
            },
            Statement::Expression(expression) => self.resolve_expression(expression, class_scope, scope, location),
            Statement::If(if_statement) => {
                self.resolve_expression(&mut if_statement.condition, class_scope, scope, location)?;
                self.resolve_statement(&mut if_statement.then_branch, class_scope, scope, location)?;
                if let Some(else_branch) = &mut if_statement.else_branch {
                    self.resolve_statement(else_branch, class_scope, scope, location)?;
                }
                Ok(())
            }
            Statement::While(while_statement) => {
                self.resolve_expression(&mut while_statement.condition, class_scope, scope, location)?;
                self.resolve_statement(&mut while_statement.body, class_scope, scope, location)
            }
            Statement::For(for_statement) => {
                self.resolve_expression(&mut for_statement.iterable, class_scope, scope, location)?;
                self.resolve_statement(&mut for_statement.body, class_scope, scope, location)
            }
            Statement::Return(Some(expression)) => self.resolve_expression(expression, class_scope, scope, location),
            Statement::Defer(defer_statement) => self.resolve_statement(&mut defer_statement.body, class_scope, scope, location),
            Statement::Return(None) | Statement::ConstructorCall(_) | Statement::Label(_) | Statement::Goto(_) | Statement::Break | Statement::Continue => Ok(()),
        }
    }

    pub(crate) fn resolve_expression(
        &mut self,
        expression: &mut Expression,
        class_scope: &NameBindings,
        scope: &NameBindings,
        location: &crate::diagnostics::SourceLocation,
    ) -> CompileResult<()> {
        match expression {
            Expression::Name(name) => {
                if let Some(Binding::LocalObject(local)) = scope.lookup(name) {
                    *expression = Expression::LocalVariableReference(*local);
                } else if let Some(Binding::Parameter(parameter)) = class_scope.lookup(name) {
                    *expression = Expression::DataMemberReference { object: None, member: *parameter };
                } else if let Some(Binding::DataMember(member)) = class_scope.lookup(name) {
                    *expression = Expression::DataMemberReference {
                        object: Some(Box::new(Expression::This)),
                        member: *member,
                    };
                } else if class_scope.lookup(name).is_some() || self.global_bindings.lookup(name).is_some() {
                    // A bare method or class name: left as `Name` for the
                    // caller (a `MethodCall`/`New`) to interpret.
                } else {
                    return Err(CompileError::new(location.clone(), CompileErrorKind::UnknownIdentifier(name.clone())));
                }
                Ok(())
            }
            Expression::MethodCall(call) => {
                if let Some(receiver) = &mut call.receiver {
                    self.resolve_expression(receiver, class_scope, scope, location)?;
                }
                for argument in &mut call.arguments {
                    self.resolve_expression(argument, class_scope, scope, location)?;
                }
                Ok(())
            }
            Expression::New(allocation) => self.resolve_expression(&mut allocation.constructor_call, class_scope, scope, location),
            Expression::NewArray(allocation) => {
                self.resolve_expression(&mut allocation.capacity, class_scope, scope, location)?;
                if let Some(elements) = &mut allocation.literal_elements {
                    for element in elements {
                        self.resolve_expression(element, class_scope, scope, location)?;
                    }
                }
                Ok(())
            }
            Expression::Subscript(subscript) => {
                self.resolve_expression(&mut subscript.array, class_scope, scope, location)?;
                self.resolve_expression(&mut subscript.index, class_scope, scope, location)
            }
            Expression::TypeCast(cast) => self.resolve_expression(&mut cast.operand, class_scope, scope, location),
            Expression::Binary { left, right, .. } => {
                self.resolve_expression(left, class_scope, scope, location)?;
                self.resolve_expression(right, class_scope, scope, location)
            }
            Expression::Unary { operand, .. } => self.resolve_expression(operand, class_scope, scope, location),
            Expression::Lambda(lambda) => self.resolve_statement(&mut lambda.body, class_scope, scope, location),
            Expression::Match(match_expression) => {
                self.resolve_expression(&mut match_expression.subject, class_scope, scope, location)?;
                let match_expression = match std::mem::replace(expression, Expression::This) {
                    Expression::Match(match_expression) => match_expression,
                    _ => unreachable!("just matched Expression::Match above"),
                };
                *expression = match_gen::lower(self, match_expression, class_scope, scope, location)?;
                Ok(())
            }
            Expression::AnonymousFunction(_) => {
                let anonymous = match std::mem::replace(expression, Expression::This) {
                    Expression::AnonymousFunction(anonymous) => anonymous,
                    _ => unreachable!("just matched Expression::AnonymousFunction above"),
                };
                *expression = closure_gen::convert_anonymous_function(self, anonymous, class_scope, scope, location)?;
                Ok(())
            }
            Expression::MemberSelector { object, .. } => self.resolve_expression(object, class_scope, scope, location),
            Expression::WrappedStatement(wrapped) => self.resolve_statement(&mut wrapped.statement, class_scope, scope, location),
            Expression::Literal(_)
            | Expression::LocalVariableReference(_)
            | Expression::DataMemberReference { .. }
            | Expression::Yield(_)
            | Expression::Temporary(_)
            | Expression::This => Ok(()),
        }
    }
}

impl Default for Tree {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalId {
    pub(crate) fn at(index: usize) -> Self {
        Self(index)
    }
}

impl DefinitionId {
    fn default_placeholder() -> Self {
        Self::at(usize::MAX)
    }

    pub(crate) fn at(index: usize) -> Self {
        // `DefinitionId`'s tuple field is `pub(crate)`, so this module can
        // construct one directly; kept as a named constructor purely so
        // call sites read as "the id at this arena slot" rather than a
        // bare tuple literal.
        Self(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bootstrap_classes_are_distinct_and_registered_globally() {
        let tree = Tree::new();
        assert_ne!(tree.object_class, tree.array_class);
        assert!(tree.global_bindings.lookup(&Identifier::from("Array")).is_some());
        assert!(tree.global_bindings.lookup(&Identifier::from("Defer")).is_some());
    }

    #[test]
    fn merging_a_module_shifts_its_definition_ids_past_the_bootstrap() {
        let mut tree = Tree::new();
        let bootstrap_len = tree.definitions.len();
        let top_level = tree.merge_source("class Counter(var count: int) { }", "test.lm").unwrap();

        assert_eq!(top_level.len(), 1);
        assert!(top_level[0].index() >= bootstrap_len);
        assert_eq!(tree.class(top_level[0]).name, Identifier::from("Counter"));
    }

    #[test]
    fn base_class_resolves_and_rejects_a_second_concrete_base() {
        let mut tree = Tree::new();
        let top_level = tree
            .merge_source("class Shape { } class Square: Shape { } class Oddity: Square, Shape { }", "test.lm")
            .unwrap();

        tree.resolve_parent_names(&top_level).unwrap();
        let square = top_level[1];
        assert_eq!(tree.class(square).base_class, Some(top_level[0]));

        let mut broken_tree = Tree::new();
        let broken_top_level = broken_tree.merge_source("class A { } class B { } class C: A, B { }", "broken.lm").unwrap();
        assert!(broken_tree.resolve_parent_names(&broken_top_level).is_err());
    }

    #[test]
    fn missing_return_is_rejected_and_always_returning_bodies_accepted() {
        let mut tree = Tree::new();
        let top_level = tree
            .merge_source("class Greeter { fun string greet() { var name: string = \"x\" } }", "test.lm")
            .unwrap();
        tree.resolve_parent_names(&top_level).unwrap();
        assert!(tree.check_return_statements(&top_level).is_err());

        let mut ok_tree = Tree::new();
        let ok_top_level = ok_tree.merge_source("class Greeter { fun string greet() { return \"hi\" } }", "test.lm").unwrap();
        ok_tree.resolve_parent_names(&ok_top_level).unwrap();
        assert!(ok_tree.check_return_statements(&ok_top_level).is_ok());
    }

    #[test]
    fn full_lower_resolves_a_data_member_reference_inside_a_method_body() {
        let mut tree = Tree::new();
        let top_level = tree
            .merge_source("class Counter(var count: int) { fun int get() { return count } }", "test.lm")
            .unwrap();

        tree.lower(&top_level).unwrap();

        let class_id = top_level[0];
        let get_method = tree.class(class_id).methods.iter().copied().find(|&id| tree.method(id).name == Identifier::from("get")).unwrap();
        let body = tree.method(get_method).body.as_ref().unwrap();
        match &body.statements[0] {
            Statement::Return(Some(Expression::DataMemberReference { member, .. })) => {
                assert_eq!(tree.data_member(*member).name, Identifier::from("count"));
            }
            other => panic!("expected a resolved data member reference, got {:?}", other),
        }
    }
}
