diesel::table! {
    dishes (id) {
        id -> Uuid,
        provider_id -> Uuid,
        price -> Numeric,
        weight -> Float8,
        calories -> Float8,
        is_removed -> Bool,
    }
}

diesel::table! {
    menu_items (id) {
        id -> Uuid,
        menu_id -> Uuid,
        dish_id -> Uuid,
        initial_count -> Int8,
        available_count -> Int8,
        price -> Numeric,
        created_at -> Nullable<Timestamptz>,
        updated_at -> Nullable<Timestamptz>,
    }
}

diesel::table! {
    menus (id) {
        id -> Uuid,
        provider_id -> Uuid,
        date -> Date,
        delivery_time -> Time,
        deadline_at -> Timestamp,
        created_at -> Nullable<Timestamptz>,
        updated_at -> Nullable<Timestamptz>,
    }
}

diesel::table! {
    orders (id) {
        id -> Uuid,
        user_id -> Uuid,
        item_id -> Uuid,
        ordered_count -> Int8,
        price -> Numeric,
        paid -> Bool,
        created_at -> Nullable<Timestamptz>,
        updated_at -> Nullable<Timestamptz>,
    }
}

diesel::table! {
    providers (id) {
        id -> Uuid,
        is_shop -> Bool,
        timezone -> Varchar,
    }
}

diesel::joinable!(menu_items -> menus (menu_id));
diesel::joinable!(orders -> menu_items (item_id));

diesel::allow_tables_to_appear_in_same_query!(
    dishes,
    menu_items,
    menus,
    orders,
    providers,
);
