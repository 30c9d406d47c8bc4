//! Relational operators over table files
//!
//! Each operator reads its inputs through the [`DbTable`] cursor interface
//! and inserts its results into an output table supplied by the caller.
//! Inputs and output must be distinct tables.

mod stats;

pub use stats::ColumnStats;

use ahash::AHashMap;
use std::str::FromStr;
use thiserror::Error;

use crate::file::BufferPool;
use crate::record::{ColumnDef, DataType, DbTable, RecordError, Tuple, TupleDesc, Value};

#[derive(Debug, Error)]
pub enum QueryError {
    #[error("Record error: {0}")]
    Record(#[from] RecordError),

    #[error("Type mismatch: {0}")]
    TypeMismatch(String),

    #[error("Integer overflow: {0}")]
    Overflow(String),

    #[error("Invalid histogram: {0}")]
    InvalidHistogram(String),
}

pub type QueryResult<T> = Result<T, QueryError>;

/// Comparison operator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PredicateOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl PredicateOp {
    pub fn eval(self, lhs: &Value, rhs: &Value) -> bool {
        match self {
            PredicateOp::Eq => lhs == rhs,
            PredicateOp::Ne => lhs != rhs,
            PredicateOp::Lt => lhs < rhs,
            PredicateOp::Le => lhs <= rhs,
            PredicateOp::Gt => lhs > rhs,
            PredicateOp::Ge => lhs >= rhs,
        }
    }
}

impl FromStr for PredicateOp {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "=" | "eq" => Ok(PredicateOp::Eq),
            "!=" | "<>" | "ne" => Ok(PredicateOp::Ne),
            "<" | "lt" => Ok(PredicateOp::Lt),
            "<=" | "le" => Ok(PredicateOp::Le),
            ">" | "gt" => Ok(PredicateOp::Gt),
            ">=" | "ge" => Ok(PredicateOp::Ge),
            _ => Err(format!("unknown comparison operator: {}", s)),
        }
    }
}

/// `field op value`
#[derive(Debug, Clone, PartialEq)]
pub struct FilterPredicate {
    pub field_name: String,
    pub op: PredicateOp,
    pub value: Value,
}

impl FilterPredicate {
    pub fn new(field_name: impl Into<String>, op: PredicateOp, value: impl Into<Value>) -> Self {
        Self {
            field_name: field_name.into(),
            op,
            value: value.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateOp {
    Min,
    Max,
    Sum,
    Avg,
    Count,
}

/// Aggregate over an INT field, optionally grouped by another field
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Aggregate {
    pub field: String,
    pub op: AggregateOp,
    pub group: Option<String>,
}

/// `left.field op right.field`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinPredicate {
    pub left: String,
    pub op: PredicateOp,
    pub right: String,
}

/// Run `f` on every tuple of `table`
///
/// The cursor is re-resolved on each step, so `f` may use the pool to
/// write to other tables.
fn for_each_tuple(
    pool: &mut BufferPool,
    table: &dyn DbTable,
    mut f: impl FnMut(&mut BufferPool, Tuple) -> QueryResult<()>,
) -> QueryResult<()> {
    let mut id = table.begin(pool)?;
    while id != table.end(pool)? {
        let tuple = table.get_tuple(pool, id)?;
        f(pool, tuple)?;
        id = table.next(pool, id)?;
    }
    Ok(())
}

/// Schema produced by [`projection`]
pub fn projection_desc(input: &TupleDesc, field_names: &[&str]) -> QueryResult<TupleDesc> {
    let columns = field_names
        .iter()
        .map(|name| {
            let index = input.index_of(name)?;
            Ok(input.columns()[index].clone())
        })
        .collect::<QueryResult<Vec<_>>>()?;
    Ok(TupleDesc::new(columns)?)
}

/// Copy the named fields of every input tuple, in the given order
pub fn projection(
    pool: &mut BufferPool,
    input: &dyn DbTable,
    output: &dyn DbTable,
    field_names: &[&str],
) -> QueryResult<()> {
    let indices = field_names
        .iter()
        .map(|name| input.tuple_desc().index_of(name))
        .collect::<Result<Vec<_>, _>>()?;

    for_each_tuple(pool, input, |pool, tuple| {
        let fields = indices
            .iter()
            .map(|&i| tuple.fields()[i].clone())
            .collect();
        output.insert_tuple(pool, &Tuple::new(fields))?;
        Ok(())
    })
}

/// Copy every input tuple satisfying all predicates
pub fn filter(
    pool: &mut BufferPool,
    input: &dyn DbTable,
    output: &dyn DbTable,
    predicates: &[FilterPredicate],
) -> QueryResult<()> {
    let desc = input.tuple_desc();
    let resolved = predicates
        .iter()
        .map(|p| {
            let index = desc.index_of(&p.field_name)?;
            let field_type = desc.columns()[index].data_type;
            if field_type != p.value.data_type() {
                return Err(QueryError::TypeMismatch(format!(
                    "{} is {}, compared with {}",
                    p.field_name,
                    field_type,
                    p.value.data_type()
                )));
            }
            Ok((index, p))
        })
        .collect::<QueryResult<Vec<_>>>()?;

    for_each_tuple(pool, input, |pool, tuple| {
        let keep = resolved
            .iter()
            .all(|(index, p)| p.op.eval(&tuple.fields()[*index], &p.value));
        if keep {
            output.insert_tuple(pool, &tuple)?;
        }
        Ok(())
    })
}

/// Hashable form of a group value
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum GroupKey {
    All,
    Int(i32),
    Double(u64),
    Text(String),
}

impl From<&Value> for GroupKey {
    fn from(value: &Value) -> Self {
        match value {
            Value::Int(i) => GroupKey::Int(*i),
            Value::Double(d) => GroupKey::Double(d.to_bits()),
            Value::Text(s) => GroupKey::Text(s.clone()),
        }
    }
}

struct Accumulator {
    group: Option<Value>,
    value: i64,
    count: i64,
}

/// Schema produced by [`aggregate`]: the group field (if any), then the result
pub fn aggregate_desc(input: &TupleDesc, agg: &Aggregate) -> QueryResult<TupleDesc> {
    let mut columns = Vec::new();
    if let Some(group) = &agg.group {
        columns.push(input.columns()[input.index_of(group)?].clone());
    }

    let result_type = match agg.op {
        AggregateOp::Avg => DataType::Double,
        _ => DataType::Int,
    };
    let result_name = format!("{:?}({})", agg.op, agg.field).to_lowercase();
    columns.push(ColumnDef::new(result_name, result_type));
    Ok(TupleDesc::new(columns)?)
}

/// Aggregate an INT field, one output tuple per group in first-seen order
///
/// AVG produces a DOUBLE, every other operator an INT. Without a group an
/// empty input produces no output.
pub fn aggregate(
    pool: &mut BufferPool,
    input: &dyn DbTable,
    output: &dyn DbTable,
    agg: &Aggregate,
) -> QueryResult<()> {
    let desc = input.tuple_desc();
    let field_index = desc.index_of(&agg.field)?;
    if desc.columns()[field_index].data_type != DataType::Int {
        return Err(QueryError::TypeMismatch(format!(
            "cannot aggregate {} field {}",
            desc.columns()[field_index].data_type,
            agg.field
        )));
    }
    let group_index = agg.group.as_deref().map(|g| desc.index_of(g)).transpose()?;

    let mut slots: AHashMap<GroupKey, usize> = AHashMap::new();
    let mut groups: Vec<Accumulator> = Vec::new();

    // Collect first: the output may be written only after the last input tuple
    for_each_tuple(pool, input, |_, tuple| {
        let group = group_index.map(|i| tuple.fields()[i].clone());
        let key = group.as_ref().map_or(GroupKey::All, GroupKey::from);
        let value = match tuple.fields()[field_index] {
            Value::Int(v) => i64::from(v),
            _ => return Err(QueryError::TypeMismatch(agg.field.clone())),
        };

        match slots.get(&key) {
            None => {
                slots.insert(key, groups.len());
                groups.push(Accumulator {
                    group,
                    value,
                    count: 1,
                });
            }
            Some(&slot) => {
                let acc = &mut groups[slot];
                acc.count += 1;
                match agg.op {
                    AggregateOp::Sum | AggregateOp::Avg => acc.value += value,
                    AggregateOp::Min => acc.value = acc.value.min(value),
                    AggregateOp::Max => acc.value = acc.value.max(value),
                    AggregateOp::Count => {}
                }
            }
        }
        Ok(())
    })?;

    for acc in groups {
        let result = match agg.op {
            AggregateOp::Avg => Value::Double(acc.value as f64 / acc.count as f64),
            AggregateOp::Count => Value::Int(to_int(acc.count, agg)?),
            _ => Value::Int(to_int(acc.value, agg)?),
        };

        let mut fields = Vec::with_capacity(2);
        fields.extend(acc.group);
        fields.push(result);
        output.insert_tuple(pool, &Tuple::new(fields))?;
    }

    Ok(())
}

fn to_int(value: i64, agg: &Aggregate) -> QueryResult<i32> {
    i32::try_from(value)
        .map_err(|_| QueryError::Overflow(format!("{:?} of {} is {}", agg.op, agg.field, value)))
}

/// Schema produced by [`join`]
///
/// The left fields followed by the right fields. For an equality join the
/// right join field is dropped, since it repeats the left one.
pub fn join_desc(left: &TupleDesc, right: &TupleDesc, pred: &JoinPredicate) -> QueryResult<TupleDesc> {
    let right_index = right.index_of(&pred.right)?;
    let right_columns = right
        .columns()
        .iter()
        .enumerate()
        .filter(|(i, _)| pred.op != PredicateOp::Eq || *i != right_index)
        .map(|(_, c)| c.clone())
        .collect();
    Ok(TupleDesc::merge(left, &TupleDesc::new(right_columns)?))
}

/// Nested-loop join writing every matching pair
pub fn join(
    pool: &mut BufferPool,
    left: &dyn DbTable,
    right: &dyn DbTable,
    output: &dyn DbTable,
    pred: &JoinPredicate,
) -> QueryResult<()> {
    let left_index = left.tuple_desc().index_of(&pred.left)?;
    let right_index = right.tuple_desc().index_of(&pred.right)?;

    let left_type = left.tuple_desc().columns()[left_index].data_type;
    let right_type = right.tuple_desc().columns()[right_index].data_type;
    if left_type != right_type {
        return Err(QueryError::TypeMismatch(format!(
            "{} is {} but {} is {}",
            pred.left, left_type, pred.right, right_type
        )));
    }

    for_each_tuple(pool, left, |pool, left_tuple| {
        let probe = &left_tuple.fields()[left_index];
        for_each_tuple(pool, right, |pool, right_tuple| {
            if !pred.op.eval(probe, &right_tuple.fields()[right_index]) {
                return Ok(());
            }

            let mut fields = left_tuple.fields().to_vec();
            fields.extend(
                right_tuple
                    .into_fields()
                    .into_iter()
                    .enumerate()
                    .filter(|(i, _)| pred.op != PredicateOp::Eq || *i != right_index)
                    .map(|(_, v)| v),
            );
            output.insert_tuple(pool, &Tuple::new(fields))?;
            Ok(())
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::Database;
    use crate::file::MemFile;
    use crate::record::HeapFile;

    fn people_schema() -> TupleDesc {
        TupleDesc::from_parts(
            &[DataType::Int, DataType::Text, DataType::Int],
            &["id", "city", "age"],
        )
        .unwrap()
    }

    fn person(id: i32, city: &str, age: i32) -> Tuple {
        Tuple::new(vec![Value::Int(id), Value::from(city), Value::Int(age)])
    }

    fn setup_people() -> Database {
        let mut db = Database::in_memory(8);
        db.create_heap_table("people", people_schema()).unwrap();
        for (id, city, age) in [
            (1, "Oslo", 30),
            (2, "Lima", 25),
            (3, "Oslo", 41),
            (4, "Pune", 25),
            (5, "Lima", 35),
        ] {
            db.insert("people", &person(id, city, age)).unwrap();
        }
        db
    }

    fn rows(db: &mut Database, table: &str) -> Vec<Tuple> {
        db.scan(table).unwrap().map(|t| t.unwrap()).collect()
    }

    #[test]
    fn test_parse_predicate_op() {
        assert_eq!("<=".parse::<PredicateOp>().unwrap(), PredicateOp::Le);
        assert_eq!("NE".parse::<PredicateOp>().unwrap(), PredicateOp::Ne);
        assert_eq!("<>".parse::<PredicateOp>().unwrap(), PredicateOp::Ne);
        assert!("~".parse::<PredicateOp>().is_err());
    }

    #[test]
    fn test_projection() {
        let mut db = setup_people();
        let desc = projection_desc(&people_schema(), &["age", "id"]).unwrap();
        db.create_heap_table("out", desc).unwrap();

        {
            let (tables, pool) = db.tables_and_pool();
            let input = tables.get("people").unwrap();
            let output = tables.get("out").unwrap();
            projection(pool, input, output, &["age", "id"]).unwrap();
        }

        let out = rows(&mut db, "out");
        assert_eq!(out.len(), 5);
        assert_eq!(out[0], Tuple::new(vec![Value::Int(30), Value::Int(1)]));
    }

    #[test]
    fn test_projection_unknown_field() {
        let mut db = setup_people();
        db.create_heap_table("out", people_schema()).unwrap();
        let (tables, pool) = db.tables_and_pool();
        let result = projection(
            pool,
            tables.get("people").unwrap(),
            tables.get("out").unwrap(),
            &["salary"],
        );
        assert!(matches!(
            result,
            Err(QueryError::Record(RecordError::FieldNotFound(_)))
        ));
    }

    #[test]
    fn test_filter_conjunction() {
        let mut db = setup_people();
        db.create_heap_table("out", people_schema()).unwrap();

        {
            let (tables, pool) = db.tables_and_pool();
            let predicates = [
                FilterPredicate::new("age", PredicateOp::Ge, 30),
                FilterPredicate::new("city", PredicateOp::Ne, "Lima"),
            ];
            filter(
                pool,
                tables.get("people").unwrap(),
                tables.get("out").unwrap(),
                &predicates,
            )
            .unwrap();
        }

        let ids: Vec<i32> = rows(&mut db, "out")
            .iter()
            .map(|t| t.fields()[0].as_int().unwrap())
            .collect();
        assert_eq!(ids, vec![1, 3]);
    }

    #[test]
    fn test_filter_type_mismatch() {
        let mut db = setup_people();
        db.create_heap_table("out", people_schema()).unwrap();
        let (tables, pool) = db.tables_and_pool();
        let result = filter(
            pool,
            tables.get("people").unwrap(),
            tables.get("out").unwrap(),
            &[FilterPredicate::new("age", PredicateOp::Eq, "thirty")],
        );
        assert!(matches!(result, Err(QueryError::TypeMismatch(_))));
    }

    fn run_aggregate(op: AggregateOp, group: Option<&str>) -> Vec<Tuple> {
        let mut db = setup_people();
        let agg = Aggregate {
            field: "age".to_string(),
            op,
            group: group.map(str::to_string),
        };
        let desc = aggregate_desc(&people_schema(), &agg).unwrap();
        db.create_heap_table("out", desc).unwrap();

        {
            let (tables, pool) = db.tables_and_pool();
            aggregate(
                pool,
                tables.get("people").unwrap(),
                tables.get("out").unwrap(),
                &agg,
            )
            .unwrap();
        }
        rows(&mut db, "out")
    }

    #[test]
    fn test_aggregate_without_group() {
        assert_eq!(
            run_aggregate(AggregateOp::Sum, None),
            vec![Tuple::new(vec![Value::Int(156)])]
        );
        assert_eq!(
            run_aggregate(AggregateOp::Count, None),
            vec![Tuple::new(vec![Value::Int(5)])]
        );
        assert_eq!(
            run_aggregate(AggregateOp::Min, None),
            vec![Tuple::new(vec![Value::Int(25)])]
        );
        assert_eq!(
            run_aggregate(AggregateOp::Avg, None),
            vec![Tuple::new(vec![Value::Double(31.2)])]
        );
    }

    #[test]
    fn test_aggregate_grouped_in_first_seen_order() {
        let out = run_aggregate(AggregateOp::Max, Some("city"));
        assert_eq!(
            out,
            vec![
                Tuple::new(vec![Value::from("Oslo"), Value::Int(41)]),
                Tuple::new(vec![Value::from("Lima"), Value::Int(35)]),
                Tuple::new(vec![Value::from("Pune"), Value::Int(25)]),
            ]
        );

        let avg = run_aggregate(AggregateOp::Avg, Some("city"));
        assert_eq!(avg[1], Tuple::new(vec![Value::from("Lima"), Value::Double(30.0)]));
    }

    #[test]
    fn test_aggregate_desc() {
        let agg = Aggregate {
            field: "age".to_string(),
            op: AggregateOp::Avg,
            group: Some("city".to_string()),
        };
        let desc = aggregate_desc(&people_schema(), &agg).unwrap();
        assert_eq!(desc.size(), 2);
        assert_eq!(desc.column(0).unwrap().data_type, DataType::Text);
        assert_eq!(desc.column(1).unwrap().name, "avg(age)");
        assert_eq!(desc.column(1).unwrap().data_type, DataType::Double);
    }

    #[test]
    fn test_aggregate_requires_int_field() {
        let mut db = setup_people();
        db.create_heap_table("out", people_schema()).unwrap();
        let (tables, pool) = db.tables_and_pool();
        let agg = Aggregate {
            field: "city".to_string(),
            op: AggregateOp::Count,
            group: None,
        };
        let result = aggregate(
            pool,
            tables.get("people").unwrap(),
            tables.get("out").unwrap(),
            &agg,
        );
        assert!(matches!(result, Err(QueryError::TypeMismatch(_))));
    }

    fn visits_schema() -> TupleDesc {
        TupleDesc::from_parts(&[DataType::Int, DataType::Double], &["id", "hours"]).unwrap()
    }

    fn setup_join() -> Database {
        let mut db = setup_people();
        db.create_btree_table("visits", visits_schema(), 0).unwrap();
        for (id, hours) in [(3, 1.5), (1, 2.0), (9, 4.0)] {
            db.insert("visits", &Tuple::new(vec![Value::Int(id), Value::Double(hours)]))
                .unwrap();
        }
        db
    }

    #[test]
    fn test_equi_join_drops_right_key() {
        let mut db = setup_join();
        let pred = JoinPredicate {
            left: "id".to_string(),
            op: PredicateOp::Eq,
            right: "id".to_string(),
        };
        let desc = join_desc(&people_schema(), &visits_schema(), &pred).unwrap();
        assert_eq!(desc.size(), 4);
        db.create_heap_table("out", desc).unwrap();

        {
            let (tables, pool) = db.tables_and_pool();
            join(
                pool,
                tables.get("people").unwrap(),
                tables.get("visits").unwrap(),
                tables.get("out").unwrap(),
                &pred,
            )
            .unwrap();
        }

        assert_eq!(
            rows(&mut db, "out"),
            vec![
                Tuple::new(vec![
                    Value::Int(1),
                    Value::from("Oslo"),
                    Value::Int(30),
                    Value::Double(2.0)
                ]),
                Tuple::new(vec![
                    Value::Int(3),
                    Value::from("Oslo"),
                    Value::Int(41),
                    Value::Double(1.5)
                ]),
            ]
        );
    }

    #[test]
    fn test_theta_join_keeps_both_keys() {
        let mut db = setup_join();
        let pred = JoinPredicate {
            left: "id".to_string(),
            op: PredicateOp::Gt,
            right: "id".to_string(),
        };
        let desc = join_desc(&people_schema(), &visits_schema(), &pred).unwrap();
        assert_eq!(desc.size(), 5);
        // Duplicate names resolve to the left copy
        assert_eq!(desc.index_of("id").unwrap(), 0);

        // The catalog rejects duplicate names, so register the output directly
        let out = HeapFile::new("out", desc).unwrap();
        db.add(Box::new(out), Box::new(MemFile::new("out"))).unwrap();

        {
            let (tables, pool) = db.tables_and_pool();
            join(
                pool,
                tables.get("people").unwrap(),
                tables.get("visits").unwrap(),
                tables.get("out").unwrap(),
                &pred,
            )
            .unwrap();
        }

        // Pairs (left.id > right.id): 2>1, 3>1, 4>1, 4>3, 5>1, 5>3
        let pairs: Vec<(i32, i32)> = rows(&mut db, "out")
            .iter()
            .map(|t| (t.fields()[0].as_int().unwrap(), t.fields()[3].as_int().unwrap()))
            .collect();
        assert_eq!(pairs, vec![(2, 1), (3, 1), (4, 1), (4, 3), (5, 1), (5, 3)]);
    }
}
