//! Result shapes: the field layout of a table's rows and of narrowed projections,
//! plus the process-wide projection cache.

use crate::error::{Error, Result};
use crate::schema::{LogicalType, Table};
use crate::sql::ColumnResolver;
use serde::ser::{Serialize, SerializeMap, Serializer};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};

const RESERVED: &[&str] = &[
    "as", "break", "const", "continue", "crate", "else", "enum", "extern", "false", "fn", "for", "if", "impl", "in",
    "let", "loop", "match", "mod", "move", "mut", "pub", "ref", "return", "self", "Self", "static", "struct", "super",
    "trait", "true", "type", "unsafe", "use", "where", "while", "async", "await", "dyn",
];

/// Output field name for a source column: spaces stripped, other invalid
/// characters replaced, and a `_` marker prefixed when the result is still
/// not a usable identifier.
pub fn field_name(column: &str) -> String {
    let stripped: String = column
        .chars()
        .filter(|c| !c.is_whitespace())
        .map(|c| if c.is_alphanumeric() || c == '_' { c } else { '_' })
        .collect();
    let starts_ok = stripped.chars().next().is_some_and(|c| c.is_alphabetic() || c == '_');
    if !starts_ok || RESERVED.contains(&stripped.as_str()) {
        format!("_{}", stripped)
    } else {
        stripped
    }
}

/// One column of a shape.
#[derive(Clone, Debug, PartialEq)]
pub struct Field {
    /// Name exposed to callers.
    pub name: String,
    /// Name the source reports.
    pub column: String,
    pub logical_type: LogicalType,
    pub is_nullable: bool,
}

/// Ordered field list with a column-name lookup, built once and shared.
#[derive(Debug)]
pub struct Shape {
    id: String,
    type_name: String,
    fields: Vec<Field>,
    by_column: HashMap<String, usize>,
}

impl Shape {
    pub fn new(id: impl Into<String>, type_name: impl Into<String>, fields: Vec<Field>) -> Self {
        let by_column = fields
            .iter()
            .enumerate()
            .map(|(i, f)| (f.column.to_lowercase(), i))
            .collect();
        Shape {
            id: id.into(),
            type_name: type_name.into(),
            fields,
            by_column,
        }
    }

    /// Full row shape of a table or query command.
    pub fn for_table(table: &Table) -> Self {
        let type_name = table
            .command
            .as_ref()
            .and_then(|c| c.data_type_name.clone())
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| format!("{}Item", field_name(table.name())));
        let mut taken = HashSet::new();
        let fields = table
            .columns
            .iter()
            .map(|c| {
                let base = field_name(&c.name);
                let mut name = base.clone();
                let mut n = 1;
                while !taken.insert(name.clone()) {
                    n += 1;
                    name = format!("{}{}", base, n);
                }
                Field {
                    name,
                    column: c.name.clone(),
                    logical_type: c.logical_type,
                    is_nullable: c.is_nullable,
                }
            })
            .collect();
        Shape::new(table.name_with_qualifier(), type_name, fields)
    }

    /// Shape with no fields, for statements that return no rows.
    pub fn empty(id: impl Into<String>) -> Self {
        let id = id.into();
        Shape::new(id.clone(), id, Vec::new())
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn field_names(&self) -> Vec<&str> {
        self.fields.iter().map(|f| f.name.as_str()).collect()
    }

    /// Position of the field reading `column`, case-insensitive.
    pub fn position_of_column(&self, column: &str) -> Option<usize> {
        self.by_column.get(&column.to_lowercase()).copied()
    }

    /// The field a caller means by `name`: exact field name, then field name
    /// ignoring case, then source column, then source column ignoring case.
    pub fn resolve(&self, name: &str) -> Option<&Field> {
        self.fields
            .iter()
            .find(|f| f.name == name)
            .or_else(|| self.fields.iter().find(|f| f.name.eq_ignore_ascii_case(name)))
            .or_else(|| self.fields.iter().find(|f| f.column == name))
            .or_else(|| self.position_of_column(name).and_then(|i| self.fields.get(i)))
    }

    /// The fields `requested` resolves to, each once, kept in this shape's order.
    /// Unknown names are ignored.
    pub fn matching(&self, requested: &[String]) -> Vec<Field> {
        let wanted: HashSet<&str> = requested
            .iter()
            .filter_map(|r| self.resolve(r))
            .map(|f| f.name.as_str())
            .collect();
        self.fields
            .iter()
            .filter(|f| wanted.contains(f.name.as_str()))
            .cloned()
            .collect()
    }

    /// True when `requested` is empty or names every field.
    pub fn covers_all(&self, requested: &[String]) -> bool {
        requested.is_empty() || self.matching(requested).len() == self.fields.len()
    }
}

/// A row materialized into a shape. Serializes as a map in field order.
#[derive(Clone, Debug)]
pub struct Record {
    shape: Arc<Shape>,
    values: Vec<Value>,
}

impl Record {
    /// A record with every field null.
    pub fn new(shape: Arc<Shape>) -> Self {
        let values = vec![Value::Null; shape.len()];
        Record { shape, values }
    }

    pub fn shape(&self) -> &Arc<Shape> {
        &self.shape
    }

    pub fn set(&mut self, index: usize, value: Value) {
        if let Some(slot) = self.values.get_mut(index) {
            *slot = value;
        }
    }

    /// Value by field name.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.shape
            .fields
            .iter()
            .position(|f| f.name == name)
            .and_then(|i| self.values.get(i))
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn to_json(&self) -> Value {
        Value::Object(
            self.shape
                .fields
                .iter()
                .zip(&self.values)
                .map(|(f, v)| (f.name.clone(), v.clone()))
                .collect(),
        )
    }
}

impl Serialize for Record {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.values.len()))?;
        for (field, value) in self.shape.fields.iter().zip(&self.values) {
            map.serialize_entry(&field.name, value)?;
        }
        map.end()
    }
}

type ShapeKey = (String, Vec<String>);

/// Projection shapes keyed by base shape id and the exact ordered field list.
/// Entries are never evicted.
#[derive(Debug, Default)]
pub struct ShapeCache {
    entries: RwLock<HashMap<ShapeKey, Arc<Shape>>>,
    constructed: AtomicUsize,
}

impl ShapeCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached projection of `base` onto `requested`. Construction happens at most
    /// once per key.
    pub fn get_or_create_projection(&self, base: &Shape, requested: &[String]) -> Result<Arc<Shape>> {
        let fields = base.matching(requested);
        if fields.is_empty() {
            return Err(Error::translation(format!(
                "none of [{}] is a field of {}",
                requested.join(", "),
                base.type_name()
            )));
        }
        let key: ShapeKey = (base.id().to_string(), fields.iter().map(|f| f.name.clone()).collect());

        {
            let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
            if let Some(shape) = entries.get(&key) {
                return Ok(shape.clone());
            }
        }

        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        if let Some(shape) = entries.get(&key) {
            return Ok(shape.clone());
        }
        let id = format!("{}[{}]", key.0, key.1.join(","));
        let shape = Arc::new(Shape::new(id, format!("{}Projection", base.type_name()), fields));
        self.constructed.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(shape = %shape.id(), "projection shape created");
        entries.insert(key, shape.clone());
        Ok(shape)
    }

    /// Number of projection shapes built so far.
    pub fn constructed(&self) -> usize {
        self.constructed.load(Ordering::Relaxed)
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or_else(|e| e.into_inner().len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ColumnResolver for Shape {
    fn resolve_column(&self, name: &str) -> Option<(&str, LogicalType)> {
        self.resolve(name).map(|f| (f.column.as_str(), f.logical_type))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SqlCommand;

    fn table() -> Table {
        let mut t = Table::new("orders", "public");
        t.add_column("id", LogicalType::Integer, false);
        t.add_column("Customer Name", LogicalType::String, true);
        t.add_column("type", LogicalType::String, true);
        t.add_column("1st", LogicalType::Integer, true);
        t.add_column("total", LogicalType::Decimal, true);
        t
    }

    fn names(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn field_names_are_sanitized() {
        assert_eq!(field_name("Customer Name"), "CustomerName");
        assert_eq!(field_name("type"), "_type");
        assert_eq!(field_name("1st"), "_1st");
        assert_eq!(field_name("unit-price"), "unit_price");
        assert_eq!(field_name("plain"), "plain");
    }

    #[test]
    fn table_shape() {
        let shape = Shape::for_table(&table());
        assert_eq!(shape.id(), "public.orders");
        assert_eq!(shape.type_name(), "ordersItem");
        assert_eq!(shape.field_names(), vec!["id", "CustomerName", "_type", "_1st", "total"]);
        assert_eq!(shape.position_of_column("customer name"), Some(1));
    }

    #[test]
    fn colliding_field_names_get_suffixes() {
        let mut t = Table::new("t", "");
        t.add_column("a b", LogicalType::String, true);
        t.add_column("ab", LogicalType::String, true);
        assert_eq!(Shape::for_table(&t).field_names(), vec!["ab", "ab2"]);
    }

    #[test]
    fn names_resolve_to_fields_before_columns() {
        let mut t = Table::new("t", "");
        t.add_column("a b", LogicalType::String, true);
        t.add_column("ab", LogicalType::Integer, true);
        t.add_column("Home City", LogicalType::String, true);
        let shape = Shape::for_table(&t);

        assert_eq!(shape.resolve("ab").map(|f| f.column.as_str()), Some("a b"));
        assert_eq!(shape.resolve("ab2").map(|f| f.column.as_str()), Some("ab"));
        assert_eq!(shape.resolve("homecity").map(|f| f.column.as_str()), Some("Home City"));
        assert_eq!(shape.resolve("home city").map(|f| f.name.as_str()), Some("HomeCity"));
        assert!(shape.resolve("nosuch").is_none());

        assert_eq!(shape.resolve_column("ab2"), Some(("ab", LogicalType::Integer)));
        let only_ab: Vec<String> = shape.matching(&names(&["ab"])).into_iter().map(|f| f.name).collect();
        assert_eq!(only_ab, vec!["ab"]);
    }

    #[test]
    fn command_shape_uses_declared_type_name() {
        let mut cmd = SqlCommand::new("SELECT 1 AS x");
        cmd.data_type_name = Some("Answer".into());
        let mut t = Table::from_command("answer", cmd);
        t.add_column("x", LogicalType::Integer, true);
        assert_eq!(Shape::for_table(&t).type_name(), "Answer");
    }

    #[test]
    fn projection_is_cached_by_field_set() {
        let cache = ShapeCache::new();
        let base = Shape::for_table(&table());
        let first = cache.get_or_create_projection(&base, &names(&["total", "id"])).unwrap();
        assert_eq!(first.field_names(), vec!["id", "total"]);
        assert_eq!(cache.constructed(), 1);

        let second = cache.get_or_create_projection(&base, &names(&["ID", "total"])).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(cache.constructed(), 1);

        cache.get_or_create_projection(&base, &names(&["id"])).unwrap();
        assert_eq!(cache.constructed(), 2);
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn projection_needs_a_known_field() {
        let cache = ShapeCache::new();
        let base = Shape::for_table(&table());
        assert!(matches!(
            cache.get_or_create_projection(&base, &names(&["nope"])),
            Err(Error::Translation(_))
        ));
        assert!(cache.is_empty());
    }

    #[test]
    fn coverage() {
        let base = Shape::for_table(&table());
        assert!(base.covers_all(&[]));
        assert!(base.covers_all(&names(&["id", "customer name", "type", "1st", "total"])));
        assert!(!base.covers_all(&names(&["id"])));
    }

    #[test]
    fn records_serialize_in_field_order() {
        let base = Arc::new(Shape::for_table(&table()));
        let mut r = Record::new(base);
        r.set(0, Value::from(7));
        r.set(4, Value::from("9.50"));
        let json = serde_json::to_string(&r).unwrap();
        assert_eq!(json, r#"{"id":7,"CustomerName":null,"_type":null,"_1st":null,"total":"9.50"}"#);
        assert_eq!(r.get("total"), Some(&Value::from("9.50")));
    }

    #[test]
    fn concurrent_lookups_build_once() {
        let cache = Arc::new(ShapeCache::new());
        let base = Arc::new(Shape::for_table(&table()));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cache = cache.clone();
                let base = base.clone();
                std::thread::spawn(move || cache.get_or_create_projection(&base, &names(&["id", "total"])).unwrap())
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(cache.constructed(), 1);
    }
}
