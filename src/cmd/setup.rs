//! `kennel setup-sql`: schema for the hosted store.

/// Creates both tables, their indexes and adds `cells` to the realtime
/// publication. Safe to run more than once.
pub const SETUP_SQL: &str = r#"-- Kennel Care Tracker schema
create table if not exists public.cells (
    id bigint generated by default as identity primary key,
    cage_num integer not null check (cage_num > 0),
    cell_side text not null check (cell_side in ('Inner', 'Outer', 'Both')),
    state smallint not null default 0 check (state in (0, 1, 2)),
    notes text check (notes is null or char_length(notes) <= 500),
    created_at timestamptz not null default now(),
    updated_at timestamptz not null default now()
);

create index if not exists idx_cells_cage on public.cells (cage_num);

create table if not exists public.cage_configurations (
    cage_num integer primary key check (cage_num > 0),
    is_split boolean not null default true,
    created_at timestamptz not null default now(),
    updated_at timestamptz not null default now()
);

alter table public.cells enable row level security;
alter table public.cage_configurations enable row level security;

drop policy if exists "kennel cells access" on public.cells;
create policy "kennel cells access" on public.cells
    for all using (true) with check (true);

drop policy if exists "kennel configurations access" on public.cage_configurations;
create policy "kennel configurations access" on public.cage_configurations
    for all using (true) with check (true);

-- Delete notifications carry the full old row.
alter table public.cells replica identity full;

do $$
begin
    if not exists (
        select 1 from pg_publication_tables
        where pubname = 'supabase_realtime' and schemaname = 'public' and tablename = 'cells'
    ) then
        alter publication supabase_realtime add table public.cells;
    end if;
end $$;

insert into public.cage_configurations (cage_num, is_split)
select n, true from generate_series(1, 21) as n
on conflict (cage_num) do nothing;
"#;

pub fn cmd_setup_sql() {
    print!("{}", SETUP_SQL);
}
