// habitsync schema - Habitica mirror tables for Diesel ORM

diesel::table! {
    tags (id) {
        id -> Text,
        name -> Text,
    }
}

diesel::table! {
    tasks (id) {
        id -> Text,
        name -> Text,
        task_type -> Text,
        date_created -> BigInt,
    }
}

diesel::table! {
    task_tags (task_id, tag_id) {
        task_id -> Text,
        tag_id -> Text,
    }
}

diesel::table! {
    history (id) {
        id -> Integer,
        task_id -> Text,
        date_created -> BigInt,
        value -> Double,
        adjust -> Integer,
    }
}

diesel::table! {
    checklist_items (id) {
        id -> Integer,
        history_id -> Integer,
        name -> Text,
        completed -> Bool,
    }
}

diesel::allow_tables_to_appear_in_same_query!(tags, tasks, task_tags, history, checklist_items);
