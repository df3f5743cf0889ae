//! Query translation: generic query options or command arguments to a bound statement.

use crate::config::SqlCommand;
use crate::error::{Error, Result};
use crate::schema::Table;
use crate::shape::Shape;
use crate::sql::{
    odata, BindValue, QueryOptionMap, SqlCompiler, Statement, OPTION_FILTER, OPTION_ORDERBY, OPTION_SELECT,
    OPTION_SKIP, OPTION_TOP,
};
use serde::Deserialize;
use serde_json::{Map, Value};

/// The generic query algebra accepted by every table endpoint.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
pub struct QueryOptions {
    #[serde(default, alias = "$select")]
    pub select: Option<String>,
    #[serde(default, alias = "$filter")]
    pub filter: Option<String>,
    #[serde(default, alias = "$orderby")]
    pub orderby: Option<String>,
    #[serde(default, alias = "$top")]
    pub top: Option<u64>,
    #[serde(default, alias = "$skip")]
    pub skip: Option<u64>,
    #[serde(default, alias = "$count")]
    pub count: bool,
}

impl QueryOptions {
    pub fn select(mut self, select: impl Into<String>) -> Self {
        self.select = Some(select.into());
        self
    }

    pub fn filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }

    pub fn orderby(mut self, orderby: impl Into<String>) -> Self {
        self.orderby = Some(orderby.into());
        self
    }

    pub fn top(mut self, top: u64) -> Self {
        self.top = Some(top);
        self
    }

    pub fn skip(mut self, skip: u64) -> Self {
        self.skip = Some(skip);
        self
    }

    pub fn count(mut self) -> Self {
        self.count = true;
        self
    }

    fn has_sql_options(&self) -> bool {
        self.filter.is_some() || self.orderby.is_some() || self.top.is_some() || self.skip.is_some() || self.count
    }
}

/// A statement ready for the executor. Single use.
#[derive(Clone, Debug)]
pub struct TranslatedQuery {
    pub statement: Statement,
    pub is_count: bool,
    /// Requested field names, used to pick the projection shape.
    pub fields: Vec<String>,
}

impl TranslatedQuery {
    pub fn sql(&self) -> &str {
        &self.statement.sql
    }
}

/// Translate options against a physical table, or against a query command with `args`.
/// Names in the options resolve through `shape`; `fields` holds the exact field names selected.
pub fn translate_table(
    table: &Table,
    shape: &Shape,
    options: &QueryOptions,
    args: &Map<String, Value>,
    compiler: &dyn SqlCompiler,
) -> Result<TranslatedQuery> {
    let mut fields: Vec<String> = Vec::new();
    let mut map = QueryOptionMap::new();

    if let Some(select) = options.select.as_deref() {
        for name in odata::parse_select(select)? {
            let field = shape.resolve(&name).ok_or_else(|| {
                Error::translation(format!("'{}' is not a field of {}", name, table.name_with_qualifier()))
            })?;
            if !fields.contains(&field.name) {
                fields.push(field.name.clone());
            }
        }
        if !fields.is_empty() {
            map.insert(OPTION_SELECT.to_string(), fields.join(","));
        }
    }

    if let Some(command) = &table.command {
        if options.has_sql_options() {
            return Err(Error::translation(format!(
                "'{}' is a command; only select is supported",
                table.name()
            )));
        }
        let mut translated = translate_command(table.name(), command, args)?;
        translated.fields = fields;
        return Ok(translated);
    }
    if !args.is_empty() {
        return Err(Error::translation(format!(
            "table {} takes no arguments",
            table.name_with_qualifier()
        )));
    }

    if let Some(filter) = options.filter.as_deref().filter(|f| !f.trim().is_empty()) {
        map.insert(OPTION_FILTER.to_string(), filter.to_string());
    }
    if let Some(orderby) = options.orderby.as_deref().filter(|o| !o.trim().is_empty()) {
        map.insert(OPTION_ORDERBY.to_string(), orderby.to_string());
    }
    if let Some(top) = options.top {
        map.insert(OPTION_TOP.to_string(), top.to_string());
    }
    if let Some(skip) = options.skip {
        map.insert(OPTION_SKIP.to_string(), skip.to_string());
    }

    let compiled = compiler.compile(table.name_with_qualifier(), shape, &map, options.count)?;
    Ok(TranslatedQuery {
        statement: Statement::positional(compiled.sql, compiled.params),
        is_count: options.count,
        fields,
    })
}

/// Bind a declared command's parameters, in declaration order, from an argument object.
pub fn translate_command(name: &str, command: &SqlCommand, args: &Map<String, Value>) -> Result<TranslatedQuery> {
    let declared = command.typed_parameters(name)?;

    for key in args.keys() {
        let known = declared
            .iter()
            .any(|(p, _)| p.name.trim_start_matches('@').eq_ignore_ascii_case(key.trim_start_matches('@')));
        if !known {
            return Err(Error::translation(format!("command '{}' has no parameter '{}'", name, key)));
        }
    }

    let mut params = Vec::with_capacity(declared.len());
    for (parameter, ty) in declared {
        let bare = parameter.name.trim_start_matches('@');
        let supplied = args
            .iter()
            .find(|(k, _)| k.trim_start_matches('@').eq_ignore_ascii_case(bare))
            .map(|(_, v)| v);
        let value = match (supplied, &parameter.default_value) {
            (Some(v), _) => BindValue::coerce(v, ty)?,
            (None, Some(default)) => BindValue::coerce(default, ty)?,
            (None, None) if parameter.optional => BindValue::Null,
            (None, None) => {
                return Err(Error::translation(format!(
                    "command '{}' requires parameter '{}'",
                    name, parameter.name
                )))
            }
        };
        params.push((parameter.name.clone(), value));
    }

    Ok(TranslatedQuery {
        statement: Statement::named(command.command_text.clone(), params),
        is_count: false,
        fields: Vec::new(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SqlCommandParameter;
    use crate::schema::LogicalType;
    use crate::sql::{Dialect, ODataCompiler};
    use serde_json::json;

    fn users() -> Table {
        let mut t = Table::new("users", "");
        t.add_column("id", LogicalType::Integer, false);
        t.add_column("name", LogicalType::String, true);
        t.add_column("Home City", LogicalType::String, true);
        t
    }

    fn translate(table: &Table, options: QueryOptions, args: &Map<String, Value>) -> Result<TranslatedQuery> {
        translate_table(table, &Shape::for_table(table), &options, args, &ODataCompiler::new(Dialect::Sqlite))
    }

    #[test]
    fn select_maps_fields_to_columns() {
        let q = translate(&users(), QueryOptions::default().select("HomeCity, ID, id"), &Map::new()).unwrap();
        assert_eq!(q.sql(), "SELECT \"Home City\", \"id\" FROM \"users\"");
        assert_eq!(q.fields, vec!["HomeCity", "id"]);
        assert!(!q.is_count);
    }

    #[test]
    fn unknown_select_is_rejected() {
        let err = translate(&users(), QueryOptions::default().select("id,salary"), &Map::new()).unwrap_err();
        assert!(matches!(err, Error::Translation(ref m) if m.contains("salary")));
    }

    #[test]
    fn filter_and_order_use_field_names() {
        let q = translate(
            &users(),
            QueryOptions::default().filter("HomeCity eq 'Oslo'").orderby("HomeCity desc"),
            &Map::new(),
        )
        .unwrap();
        assert_eq!(q.sql(), "SELECT * FROM \"users\" WHERE \"Home City\" = ?1 ORDER BY \"Home City\" DESC");

        for options in [
            QueryOptions::default().filter("salary gt 10"),
            QueryOptions::default().orderby("salary"),
            QueryOptions::default().orderby("salary").count(),
        ] {
            let err = translate(&users(), options, &Map::new()).unwrap_err();
            assert!(matches!(err, Error::Translation(ref m) if m.contains("salary")));
        }
    }

    #[test]
    fn field_names_win_over_similar_columns() {
        let mut t = Table::new("pairs", "");
        t.add_column("a b", LogicalType::String, true);
        t.add_column("ab", LogicalType::String, true);

        let q = translate(&t, QueryOptions::default().select("ab"), &Map::new()).unwrap();
        assert_eq!(q.sql(), "SELECT \"a b\" FROM \"pairs\"");
        assert_eq!(q.fields, vec!["ab"]);

        let q = translate(&t, QueryOptions::default().select("ab2").filter("ab2 eq 'y'"), &Map::new()).unwrap();
        assert_eq!(q.sql(), "SELECT \"ab\" FROM \"pairs\" WHERE \"ab\" = ?1");
        assert_eq!(q.fields, vec!["ab2"]);
    }

    #[test]
    fn count_with_filter() {
        let q = translate(&users(), QueryOptions::default().filter("name eq 'a'").top(3).count(), &Map::new()).unwrap();
        assert!(q.is_count);
        assert_eq!(q.sql(), "SELECT COUNT(*) FROM \"users\" WHERE \"name\" = ?1");
    }

    #[test]
    fn paging_and_order_are_forwarded() {
        let q = translate(&users(), QueryOptions::default().orderby("name desc").top(2).skip(4), &Map::new()).unwrap();
        assert_eq!(q.sql(), "SELECT * FROM \"users\" ORDER BY \"name\" DESC LIMIT 2 OFFSET 4");
    }

    #[test]
    fn options_deserialize_from_dollar_names() {
        let o: QueryOptions = serde_json::from_value(json!({"$select": "a", "$top": 5, "count": true})).unwrap();
        assert_eq!(o, QueryOptions::default().select("a").top(5).count());
    }

    fn by_city() -> SqlCommand {
        SqlCommand::new("SELECT * FROM users WHERE \"Home City\" = @city AND id > @min")
            .with_parameter(SqlCommandParameter::new("city", "string"))
            .with_parameter(SqlCommandParameter::new("min", "int").with_default(json!(0)))
            .with_parameter(SqlCommandParameter::new("tag", "string").optional())
    }

    fn args(v: Value) -> Map<String, Value> {
        v.as_object().cloned().unwrap_or_default()
    }

    #[test]
    fn command_arguments_bind_in_declaration_order() {
        let q = translate_command("byCity", &by_city(), &args(json!({"min": "5", "@City": "Oslo"}))).unwrap();
        assert_eq!(
            q.statement.params,
            vec![
                ("city".to_string(), BindValue::String("Oslo".into())),
                ("min".to_string(), BindValue::I64(5)),
                ("tag".to_string(), BindValue::Null),
            ]
        );
        assert_eq!(q.sql(), by_city().command_text);
    }

    #[test]
    fn command_defaults_apply() {
        let q = translate_command("byCity", &by_city(), &args(json!({"city": "Rome"}))).unwrap();
        assert_eq!(q.statement.params[1].1, BindValue::I64(0));
    }

    #[test]
    fn command_argument_errors() {
        assert!(matches!(
            translate_command("byCity", &by_city(), &Map::new()),
            Err(Error::Translation(ref m)) if m.contains("city")
        ));
        assert!(translate_command("byCity", &by_city(), &args(json!({"city": "x", "extra": 1}))).is_err());
        assert!(translate_command("byCity", &by_city(), &args(json!({"city": "x", "min": "many"}))).is_err());
    }

    #[test]
    fn query_command_table_rejects_sql_options() {
        let mut t = Table::from_command("byCity", by_city());
        t.add_column("id", LogicalType::Integer, false);
        assert!(translate(&t, QueryOptions::default().top(1), &args(json!({"city": "x"}))).is_err());
        let q = translate(&t, QueryOptions::default().select("id"), &args(json!({"city": "x"}))).unwrap();
        assert_eq!(q.fields, vec!["id"]);
        assert_eq!(q.statement.params.len(), 3);
    }

    #[test]
    fn tables_take_no_arguments() {
        assert!(translate(&users(), QueryOptions::default(), &args(json!({"x": 1}))).is_err());
    }
}
