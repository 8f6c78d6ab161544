diesel::table! {
    case_sequences (year) {
        year -> Int4,
        value -> Int8,
    }
}

diesel::table! {
    cases (id) {
        id -> Uuid,
        #[max_length = 20]
        case_number -> Varchar,
        owner_id -> Uuid,
        #[max_length = 255]
        title -> Varchar,
        description -> Text,
        #[max_length = 16]
        status -> Varchar,
        court_info -> Nullable<Jsonb>,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    documents (id) {
        id -> Uuid,
        case_id -> Uuid,
        #[max_length = 255]
        title -> Varchar,
        #[max_length = 100]
        document_type -> Varchar,
        file_url -> Text,
        #[max_length = 500]
        storage_key -> Varchar,
        uploaded_by -> Uuid,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    updates (id) {
        id -> Uuid,
        case_id -> Uuid,
        message -> Text,
        #[max_length = 16]
        update_type -> Varchar,
        created_by -> Uuid,
        is_automatic -> Bool,
        created_at -> Timestamptz,
    }
}

diesel::joinable!(documents -> cases (case_id));
diesel::joinable!(updates -> cases (case_id));

diesel::allow_tables_to_appear_in_same_query!(case_sequences, cases, documents, updates);
