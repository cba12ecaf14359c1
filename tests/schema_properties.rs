use proptest::prelude::*;
use textflow::data::{Attribute, AttributeType, Schema, Tuple, Value};
use textflow::operator::{
    collect_tuples, BoxedOperator, Operator, ProjectedField, Projection, Sort, SortCriteria,
    SortOrder, TupleSource,
};

fn attribute_type() -> impl Strategy<Value = AttributeType> {
    prop_oneof![
        Just(AttributeType::String),
        Just(AttributeType::Integer),
        Just(AttributeType::Long),
        Just(AttributeType::Double),
        Just(AttributeType::Boolean),
        Just(AttributeType::Text),
    ]
}

/// Schemas with unique, non-reserved names
fn schema() -> impl Strategy<Value = Schema> {
    prop::collection::vec(attribute_type(), 1..6).prop_map(|types| {
        let attributes = types
            .into_iter()
            .enumerate()
            .map(|(i, t)| Attribute::new(format!("a{}", i), t))
            .collect();
        Schema::new(attributes).expect("generated names are unique")
    })
}

fn drain(mut operator: BoxedOperator) -> Vec<Tuple> {
    operator.open().expect("open");
    let tuples = collect_tuples(operator.as_mut()).expect("drain");
    operator.close().expect("close");
    tuples
}

proptest! {
    #[test]
    fn schema_equality_follows_attribute_pairs(a in schema(), b in schema()) {
        prop_assert_eq!(a.clone(), a.clone());
        prop_assert_eq!(a == b, b == a);
        prop_assert_eq!(a == b, a.attributes() == b.attributes());
    }

    #[test]
    fn identity_is_added_at_most_once(s in schema()) {
        let with_id = s.with_id().expect("first application succeeds");
        prop_assert_eq!(with_id.len(), s.len() + 1);
        prop_assert_eq!(&with_id.attributes()[1..], s.attributes());
        prop_assert!(with_id.with_id().is_err());
    }

    #[test]
    fn projection_selects_positions_in_order(
        s in schema(),
        picks in prop::collection::vec(any::<prop::sample::Index>(), 1..8),
    ) {
        let indices: Vec<usize> = picks.iter().map(|p| p.index(s.len())).collect();
        let fields = indices
            .iter()
            .enumerate()
            .map(|(n, &i)| ProjectedField::aliased(i, format!("p{}", n)))
            .collect();
        let source = TupleSource::new(s.clone(), vec![]).expect("empty source");
        let projection = Projection::new(Box::new(source), fields).expect("indices are in range");

        let projected = projection.output_schema();
        prop_assert_eq!(projected.len(), indices.len());
        for (attribute, &i) in projected.attributes().iter().zip(&indices) {
            prop_assert_eq!(attribute.attribute_type(), s.attributes()[i].attribute_type());
        }
    }

    #[test]
    fn sort_is_ordered_and_stable(
        keys in prop::collection::vec(0i32..4, 0..40),
        descending in any::<bool>(),
    ) {
        let schema = Schema::new(vec![
            Attribute::new("key", AttributeType::Integer),
            Attribute::new("seq", AttributeType::Integer),
        ]).expect("unique names");
        // seq records the input position so stability can be checked
        let values = keys
            .iter()
            .enumerate()
            .map(|(seq, key)| vec![Value::Integer(*key), Value::Integer(seq as i32)])
            .collect();
        let order = if descending { SortOrder::Desc } else { SortOrder::Asc };
        let source = TupleSource::new(schema, values).expect("rows match schema");
        let sort = Sort::new(Box::new(source), vec![SortCriteria::new("key", order)])
            .expect("key exists");

        let sorted: Vec<(i32, i32)> = drain(Box::new(sort))
            .iter()
            .map(|t| match t.fields() {
                [Value::Integer(key), Value::Integer(seq)] => (*key, *seq),
                other => panic!("unexpected fields {:?}", other),
            })
            .collect();

        prop_assert_eq!(sorted.len(), keys.len());
        for pair in sorted.windows(2) {
            let ((k1, s1), (k2, s2)) = (pair[0], pair[1]);
            if descending {
                prop_assert!(k1 >= k2);
            } else {
                prop_assert!(k1 <= k2);
            }
            if k1 == k2 {
                prop_assert!(s1 < s2);
            }
        }
    }
}
