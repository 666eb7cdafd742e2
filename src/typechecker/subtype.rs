use super::Type;

/// Whether a value of type `sub` may be used where `sup` is expected.
pub fn is_subtype(sub: &Type, sup: &Type) -> bool {
    match (sub, sup) {
        (Type::Error, _) | (_, Type::Error) => true,
        (_, Type::Any) => true,

        (Type::Array(a), Type::Array(b)) => is_subtype(a, b),

        (Type::Tuple(a), Type::Tuple(b)) => {
            a.len() == b.len() && a.iter().zip(b).all(|(a, b)| is_subtype(a, b))
        }

        // width subtyping: `sub` must carry every field `sup` declares
        (Type::Struct { fields: a, .. }, Type::Struct { fields: b, .. }) => {
            b.iter().all(|(name, expected)| {
                a.get(name)
                    .is_some_and(|actual| is_subtype(actual, expected))
            })
        }

        (
            Type::Function {
                params: params_a,
                return_type: ret_a,
            },
            Type::Function {
                params: params_b,
                return_type: ret_b,
            },
        ) => {
            params_a.len() == params_b.len()
                && params_b
                    .iter()
                    .zip(params_a)
                    .all(|(expected, actual)| is_subtype(expected, actual))
                && is_subtype(ret_a, ret_b)
        }

        _ => sub == sup,
    }
}
