//! Property tests for transform chains
//!
//! Whatever sequence of transforms is stacked on a table, every row it
//! produces has exactly as many values as its header has fields.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use proptest::collection::vec;
use proptest::prelude::*;
use taxitrips_engine::fields::FieldDefinition;
use taxitrips_engine::table::{Record, Table, Value};

#[derive(Debug, Clone)]
enum Op {
    Append,
    InsertAt(usize),
    Computed(usize),
    Cut(usize),
    CutoutOne(usize),
    Convert(usize),
    Rename(usize),
    SelfConcat,
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        Just(Op::Append),
        (0usize..64).prop_map(Op::InsertAt),
        (0usize..64).prop_map(Op::Computed),
        (0usize..64).prop_map(Op::Cut),
        (0usize..64).prop_map(Op::CutoutOne),
        (0usize..64).prop_map(Op::Convert),
        (0usize..64).prop_map(Op::Rename),
        Just(Op::SelfConcat),
    ]
}

fn fresh(counter: &mut usize) -> String {
    *counter += 1;
    format!("f{counter}")
}

/// Apply `op`, keeping `names` in step with the expected header.
fn apply(table: Table, names: &mut Vec<String>, op: &Op, counter: &mut usize) -> Table {
    let len = names.len();
    match *op {
        Op::Append => {
            let name = fresh(counter);
            names.push(name.clone());
            table.add_field(FieldDefinition::fixed(name, "x"))
        }
        Op::InsertAt(seed) => {
            let name = fresh(counter);
            let index = seed % (len + 1);
            names.insert(index, name.clone());
            table.add_field(FieldDefinition::fixed(name, 1_i64).at(index))
        }
        Op::Computed(seed) => {
            let source = names[seed % len].clone();
            let name = fresh(counter);
            names.push(name.clone());
            table.add_field(FieldDefinition::computed(name, move |r: &Record<'_>| {
                Ok(r.field(&source)?.clone())
            }))
        }
        Op::Cut(seed) => {
            let kept: Vec<String> = names
                .iter()
                .cycle()
                .skip(seed % len)
                .take(seed % len + 1)
                .cloned()
                .collect();
            *names = kept.clone();
            table.cut(kept)
        }
        Op::CutoutOne(seed) if len > 1 => {
            let field = names.remove(seed % len);
            table.cutout([field])
        }
        Op::CutoutOne(_) => table,
        Op::Convert(seed) => table.convert(names[seed % len].clone(), |v: Value| {
            Ok(Value::from(v.to_text().to_uppercase()))
        }),
        Op::Rename(seed) => {
            let name = fresh(counter);
            let old = std::mem::replace(&mut names[seed % len], name.clone());
            table.rename(old, name)
        }
        Op::SelfConcat => table.concatenate([table.clone()]),
    }
}

proptest! {
    #[test]
    fn rows_match_header_width(
        width in 1usize..6,
        raw in vec(vec("[a-z]{0,3}", 0..8), 0..10),
        pad_with_injector in any::<bool>(),
        ops in vec(op(), 1..8),
    ) {
        let header: Vec<String> = (0..width).map(|i| format!("c{i}")).collect();
        let rows = raw
            .into_iter()
            .map(|r| r.into_iter().map(Value::from).collect())
            .collect();
        let base = Table::from_rows(header.clone(), rows).unwrap();

        // Ragged input is squared up by the first transform
        let mut names = header.clone();
        let mut counter = 0;
        let mut table = if pad_with_injector {
            names.push("pad".to_string());
            base.add_field(FieldDefinition::fixed("pad", Value::Null))
        } else {
            base.cut(header)
        };
        for op in &ops {
            table = apply(table, &mut names, op, &mut counter);
        }

        let stream = table.open().unwrap();
        prop_assert_eq!(stream.header().names(), names.as_slice());
        let width = stream.header().len();
        for row in stream {
            prop_assert_eq!(row.unwrap().len(), width);
        }
    }

    #[test]
    fn appends_land_in_call_order(count in 1usize..6) {
        let base = Table::from_rows(["a"], vec![vec![Value::from("1")]]).unwrap();
        let added: Vec<String> = (0..count).map(|i| format!("n{i}")).collect();
        let table = base.add_fields(
            added.iter().map(|n| FieldDefinition::fixed(n.as_str(), n.as_str())).collect(),
        );

        let mut expected = vec!["a".to_string()];
        expected.extend(added.iter().cloned());
        prop_assert_eq!(table.fieldnames().unwrap(), expected.clone());
        let row = table.open().unwrap().next().unwrap().unwrap();
        let expected_values = added.iter().map(|n| Value::from(n.as_str())).collect::<Vec<_>>();
        prop_assert_eq!(&row[1..], expected_values.as_slice());
    }
}
