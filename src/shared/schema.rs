diesel::table! {
    tickets (id) {
        id -> Int4,
        title -> Varchar,
        description -> Text,
        category -> Varchar,
        priority -> Varchar,
        status -> Varchar,
        comment -> Nullable<Text>,
        created_at -> Timestamptz,
    }
}
