// One partition row per room; entries are keyed by (room_id, entry_key).

diesel::table! {
    room_partitions (room_id) {
        room_id -> Text,
        created_at -> Text,
    }
}

diesel::table! {
    room_entries (room_id, entry_key) {
        room_id -> Text,
        entry_key -> Text,
        entry_value -> Text,
        updated_at -> Text,
    }
}

diesel::joinable!(room_entries -> room_partitions (room_id));

diesel::allow_tables_to_appear_in_same_query!(room_partitions, room_entries);
