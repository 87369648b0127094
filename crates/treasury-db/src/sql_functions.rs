use diesel::sql_types::{Array, Text};

diesel::define_sql_function! {
    fn lower(x: Text) -> Text;
}

diesel::define_sql_function! {
    /// Number of elements of a (one dimensional) array - zero for an empty array
    fn cardinality(x: Array<Text>) -> diesel::sql_types::Integer;
}
